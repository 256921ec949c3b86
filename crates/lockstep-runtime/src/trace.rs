#![forbid(unsafe_code)]

//! Render trace: an in-memory record of what each host pass did.
//!
//! Tests use it to prove that a transient value was rendered but never
//! painted. Values are recorded through their `Debug` representation.
//!
//! [`RenderTrace::to_jsonl`] emits one JSON object per event:
//! - `{"event":"render","component":..,"label":..,"lane":..,"value":..}`
//! - `{"event":"suspend","component":..,"label":..}`
//! - `{"event":"commit","stores":..}`
//! - `{"event":"paint","component":..,"label":..,"value":..}`
//! - `{"event":"discard"}`

use std::cell::RefCell;
use std::fmt::Write as _;

use crate::host::{ComponentId, Lane};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Render {
        component: ComponentId,
        label: String,
        lane: Lane,
        value: String,
    },
    Suspend {
        component: ComponentId,
        label: String,
    },
    Commit {
        stores: usize,
    },
    Paint {
        component: ComponentId,
        label: String,
        value: String,
    },
    Discard,
}

#[derive(Debug, Default)]
pub struct RenderTrace {
    enabled: bool,
    events: RefCell<Vec<TraceEvent>>,
}

impl RenderTrace {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            events: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn record(&self, event: TraceEvent) {
        if self.enabled {
            self.events.borrow_mut().push(event);
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    /// Values `component` rendered, in order, painted or not.
    #[must_use]
    pub fn rendered_values(&self, component: ComponentId) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                TraceEvent::Render {
                    component: c,
                    value,
                    ..
                } if *c == component => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    /// Values `component` made visible, in order.
    #[must_use]
    pub fn painted_values(&self, component: ComponentId) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                TraceEvent::Paint {
                    component: c,
                    value,
                    ..
                } if *c == component => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| matches!(event, TraceEvent::Commit { .. }))
            .count()
    }

    #[must_use]
    pub fn to_jsonl(&self) -> String {
        let mut out = String::new();
        for event in self.events.borrow().iter() {
            match event {
                TraceEvent::Render {
                    component,
                    label,
                    lane,
                    value,
                } => {
                    let _ = writeln!(
                        out,
                        r#"{{"event":"render","component":{},"label":"{}","lane":"{}","value":"{}"}}"#,
                        component.raw(),
                        escape(label),
                        lane.as_str(),
                        escape(value)
                    );
                }
                TraceEvent::Suspend { component, label } => {
                    let _ = writeln!(
                        out,
                        r#"{{"event":"suspend","component":{},"label":"{}"}}"#,
                        component.raw(),
                        escape(label)
                    );
                }
                TraceEvent::Commit { stores } => {
                    let _ = writeln!(out, r#"{{"event":"commit","stores":{stores}}}"#);
                }
                TraceEvent::Paint {
                    component,
                    label,
                    value,
                } => {
                    let _ = writeln!(
                        out,
                        r#"{{"event":"paint","component":{},"label":"{}","value":"{}"}}"#,
                        component.raw(),
                        escape(label),
                        escape(value)
                    );
                }
                TraceEvent::Discard => out.push_str("{\"event\":\"discard\"}\n"),
            }
        }
        out
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
