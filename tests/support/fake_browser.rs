//! Scripted in-memory browser for traversal tests.
//!
//! A [`FakeSite`] is a set of page states. Navigating to a routed URL shows
//! its state; clicking an element with a target switches to that state, the
//! way a postback re-renders the page in place. Elements without a target do
//! nothing when clicked, which models a dead "next" control.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use harvester_core::crawl::{
    BrowserDriver, DriverError, ElementSnapshot, LOCATION_SCRIPT, READY_STATE_SCRIPT,
};
use serde_json::Value;

/// One element on a fake page.
#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub tag: String,
    pub id: String,
    pub class_name: String,
    pub href: Option<String>,
    pub text: String,
    pub aria_label: String,
    pub visible: bool,
    pub disabled: bool,
    /// State shown after a click.
    pub target: Option<usize>,
}

impl FakeElement {
    /// A plain visible anchor.
    pub fn link(href: impl Into<String>) -> Self {
        Self {
            tag: "a".to_string(),
            href: Some(href.into()),
            visible: true,
            ..Self::default()
        }
    }

    /// A grid "next" anchor with a catalog-style id.
    pub fn next(target: Option<usize>) -> Self {
        Self {
            tag: "a".to_string(),
            id: "ctl00_ctl61_g_aNextPage".to_string(),
            href: Some("javascript:__doPostBack('ctl00$aNextPage','')".to_string()),
            text: "הבא".to_string(),
            visible: true,
            target,
            ..Self::default()
        }
    }

    /// The grid "next" anchor rendered disabled on the last page.
    pub fn disabled_next() -> Self {
        Self {
            disabled: true,
            ..Self::next(None)
        }
    }

    /// A postback anchor without a grid id.
    pub fn postback(text: &str, target: Option<usize>) -> Self {
        Self {
            tag: "a".to_string(),
            href: Some(format!("javascript:__doPostBack('ctl00$pager${text}','')")),
            text: text.to_string(),
            visible: true,
            target,
            ..Self::default()
        }
    }

    /// A visible button.
    pub fn button(text: &str) -> Self {
        Self {
            tag: "button".to_string(),
            text: text.to_string(),
            visible: true,
            ..Self::default()
        }
    }
}

/// A rendered page.
#[derive(Debug, Clone)]
pub struct FakeState {
    pub url: String,
    pub elements: Vec<FakeElement>,
}

/// What the driver was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    Navigate(String),
    Click { state: usize, text: String },
}

/// The scripted site plus the current position of the session.
#[derive(Debug, Default)]
pub struct FakeSite {
    states: Vec<FakeState>,
    routes: HashMap<String, usize>,
    current: Option<usize>,
    events: Arc<Mutex<Vec<FakeEvent>>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a state and returns its index.
    pub fn add_state(&mut self, url: impl Into<String>, elements: Vec<FakeElement>) -> usize {
        self.states.push(FakeState {
            url: url.into(),
            elements,
        });
        self.states.len() - 1
    }

    /// Adds a state that `navigate(url)` lands on.
    pub fn add_page(&mut self, url: &str, elements: Vec<FakeElement>) -> usize {
        let index = self.add_state(url, elements);
        self.routes.insert(url.to_string(), index);
        index
    }

    /// Replaces a state's elements, for wiring targets after creation.
    pub fn set_elements(&mut self, state: usize, elements: Vec<FakeElement>) {
        self.states[state].elements = elements;
    }

    /// Shared event log, readable after the site is moved into a traversal.
    pub fn events(&self) -> Arc<Mutex<Vec<FakeEvent>>> {
        Arc::clone(&self.events)
    }

    fn record(&self, event: FakeEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn state(&self) -> Option<&FakeState> {
        self.current.and_then(|index| self.states.get(index))
    }
}

/// One `[attr op 'value' flags]` filter.
struct AttrFilter {
    name: String,
    op: &'static str,
    value: String,
    case_insensitive: bool,
}

/// A compound selector such as `a#x.y[id*='z']`.
#[derive(Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrFilter>,
}

fn parse_compound(selector: &str) -> Compound {
    let mut compound = Compound::default();
    let chars: Vec<char> = selector.chars().collect();
    let mut i = 0;

    let ident_end = |start: usize| {
        let mut end = start;
        while end < chars.len()
            && (chars[end].is_alphanumeric() || chars[end] == '-' || chars[end] == '_')
        {
            end += 1;
        }
        end
    };

    let end = ident_end(0);
    if end > 0 {
        compound.tag = Some(chars[..end].iter().collect());
        i = end;
    }
    while i < chars.len() {
        match chars[i] {
            '#' => {
                let end = ident_end(i + 1);
                compound.id = Some(chars[i + 1..end].iter().collect());
                i = end;
            }
            '.' => {
                let end = ident_end(i + 1);
                compound.classes.push(chars[i + 1..end].iter().collect());
                i = end;
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|c| *c == ']')
                    .map_or(chars.len(), |p| i + p);
                let body: String = chars[i + 1..close].iter().collect();
                compound.attrs.push(parse_attr(&body));
                i = close + 1;
            }
            _ => i += 1,
        }
    }
    compound
}

fn parse_attr(body: &str) -> AttrFilter {
    for op in ["*=", "="] {
        if let Some((name, rest)) = body.split_once(op) {
            let rest = rest.trim();
            let case_insensitive = rest.ends_with(" i");
            let rest = rest.trim_end_matches(" i").trim();
            return AttrFilter {
                name: name.trim().to_string(),
                op,
                value: rest.trim_matches(|c| c == '\'' || c == '"').to_string(),
                case_insensitive,
            };
        }
    }
    AttrFilter {
        name: body.trim().to_string(),
        op: "",
        value: String::new(),
        case_insensitive: false,
    }
}

fn attribute<'a>(element: &'a FakeElement, name: &str) -> Option<&'a str> {
    match name {
        "id" => Some(element.id.as_str()).filter(|v| !v.is_empty()),
        "class" => Some(element.class_name.as_str()).filter(|v| !v.is_empty()),
        "href" => element.href.as_deref(),
        "aria-label" => Some(element.aria_label.as_str()).filter(|v| !v.is_empty()),
        _ => None,
    }
}

fn matches_compound(element: &FakeElement, compound: &Compound) -> bool {
    if compound.tag.as_deref().is_some_and(|tag| tag != element.tag) {
        return false;
    }
    if compound.id.as_deref().is_some_and(|id| id != element.id) {
        return false;
    }
    let classes: Vec<&str> = element.class_name.split_whitespace().collect();
    if !compound.classes.iter().all(|class| classes.contains(&class.as_str())) {
        return false;
    }
    compound.attrs.iter().all(|filter| {
        let Some(actual) = attribute(element, &filter.name) else {
            return false;
        };
        let (actual, expected) = if filter.case_insensitive {
            (actual.to_lowercase(), filter.value.to_lowercase())
        } else {
            (actual.to_string(), filter.value.clone())
        };
        match filter.op {
            "*=" => actual.contains(&expected),
            "=" => actual == expected,
            _ => true,
        }
    })
}

/// Last compound of a complex selector, ignoring whitespace inside `[...]`.
fn last_compound(part: &str) -> &str {
    let mut depth = 0_i32;
    let mut start = 0;
    for (index, c) in part.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            c if c.is_whitespace() && depth == 0 => start = index + c.len_utf8(),
            _ => {}
        }
    }
    &part[start..]
}

/// Matches a selector list; descendant combinators only test the last compound.
fn matches_selector(element: &FakeElement, selector: &str) -> bool {
    selector.split(',').map(str::trim).any(|part| {
        let last = last_compound(part);
        !last.is_empty() && matches_compound(element, &parse_compound(last))
    })
}

fn reference(state: usize, index: usize) -> String {
    format!("{state}-{index}")
}

#[async_trait]
impl BrowserDriver for FakeSite {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.record(FakeEvent::Navigate(url.to_string()));
        match self.routes.get(url) {
            Some(index) => {
                self.current = Some(*index);
                Ok(())
            }
            None => Err(DriverError::Navigation {
                url: url.to_string(),
                message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            }),
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, DriverError> {
        match script {
            READY_STATE_SCRIPT => Ok(Value::String("complete".to_string())),
            LOCATION_SCRIPT => Ok(Value::String(
                self.state().map(|s| s.url.clone()).unwrap_or_default(),
            )),
            _ => Err(DriverError::Script("unsupported script".to_string())),
        }
    }

    async fn query_all(&mut self, selector: &str) -> Result<Vec<ElementSnapshot>, DriverError> {
        let Some(state_index) = self.current else {
            return Ok(Vec::new());
        };
        let state = &self.states[state_index];
        Ok(state
            .elements
            .iter()
            .enumerate()
            .filter(|(_, element)| matches_selector(element, selector))
            .map(|(index, element)| ElementSnapshot {
                reference: reference(state_index, index),
                tag: element.tag.clone(),
                id: element.id.clone(),
                class_name: element.class_name.clone(),
                href: element.href.clone(),
                text: element.text.clone(),
                aria_label: element.aria_label.clone(),
                outer_html: String::new(),
                visible: element.visible,
                disabled: element.disabled,
            })
            .collect())
    }

    async fn click(&mut self, element: &ElementSnapshot) -> Result<(), DriverError> {
        let Some(state_index) = self.current else {
            return Err(DriverError::StaleElement(element.reference.clone()));
        };
        let found = self.states[state_index]
            .elements
            .iter()
            .enumerate()
            .find(|(index, _)| reference(state_index, *index) == element.reference)
            .map(|(_, found)| found.clone());
        let Some(found) = found else {
            return Err(DriverError::StaleElement(element.reference.clone()));
        };
        self.record(FakeEvent::Click {
            state: state_index,
            text: found.text.clone(),
        });
        if let Some(target) = found.target {
            self.current = Some(target);
        }
        Ok(())
    }
}
