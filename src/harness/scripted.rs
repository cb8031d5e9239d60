//! JSON-described test cases.
//!
//! ```json
//! {
//!   "name": "push_then_pop",
//!   "statements": [
//!     { "op": "construct", "class": "org.example.Stack" },
//!     { "op": "invoke", "class": "org.example.Stack", "method": "push" },
//!     { "op": "output", "text": "pushed" }
//!   ]
//! }
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use super::TestCase;
use crate::collector::CollectorProxy;
use crate::namespace::NamespaceResolver;

/// One step of a scripted test case.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Statement {
    /// Resolve `class` and bind it in scope. Instrumented units report an `<init>` event.
    Construct { class: String },
    /// Resolve `class`. Instrumented units report an event at `method`.
    Invoke { class: String, method: String },
    /// Print `text`; observers receive it through their output hook.
    Output { text: String },
    /// Fail with `message`.
    Fail { message: String },
    /// Block the executing thread for `millis`.
    Sleep { millis: u64 },
}

impl Statement {
    /// The class this statement refers to, if any.
    pub fn class(&self) -> Option<&str> {
        match self {
            Statement::Construct { class } | Statement::Invoke { class, .. } => Some(class),
            _ => None,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Construct { class } => write!(f, "new {class}()"),
            Statement::Invoke { class, method } => write!(f, "{class}.{method}()"),
            Statement::Output { text } => write!(f, "print({text:?})"),
            Statement::Fail { message } => write!(f, "fail({message:?})"),
            Statement::Sleep { millis } => write!(f, "sleep({millis})"),
        }
    }
}

/// A test case read from JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedTestCase {
    name: String,
    statements: Vec<Statement>,
    #[serde(skip)]
    resolver: Option<Arc<NamespaceResolver>>,
    #[serde(skip, default = "CollectorProxy::global")]
    proxy: Arc<CollectorProxy>,
}

impl ScriptedTestCase {
    pub fn new(name: impl Into<String>, statements: Vec<Statement>) -> Self {
        Self {
            name: name.into(),
            statements,
            resolver: None,
            proxy: CollectorProxy::global(),
        }
    }

    /// Report instrumentation events to `proxy` instead of the process-wide one.
    ///
    /// The coordinator rebinds this on every run; the builder is for driving an executor directly.
    pub fn with_proxy(mut self, proxy: Arc<CollectorProxy>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }

    pub fn from_path(path: &Path) -> Result<Self, ScriptError> {
        let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&source).map_err(|source| ScriptError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

impl TestCase for ScriptedTestCase {
    fn name(&self) -> &str {
        &self.name
    }

    fn statements(&self) -> &[Statement] {
        &self.statements
    }

    fn change_resolver(&mut self, resolver: Arc<NamespaceResolver>) {
        self.resolver = Some(resolver);
    }

    fn resolver(&self) -> Option<Arc<NamespaceResolver>> {
        self.resolver.clone()
    }

    fn change_proxy(&mut self, proxy: Arc<CollectorProxy>) {
        self.proxy = proxy;
    }

    fn proxy(&self) -> Arc<CollectorProxy> {
        Arc::clone(&self.proxy)
    }
}

/// Failure to load a scripted test case from disk.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_statement_kinds() {
        let case = ScriptedTestCase::from_json(
            r#"{
                "name": "all",
                "statements": [
                    { "op": "construct", "class": "a.B" },
                    { "op": "invoke", "class": "a.B", "method": "run" },
                    { "op": "output", "text": "hi" },
                    { "op": "fail", "message": "nope" },
                    { "op": "sleep", "millis": 5 }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(case.name(), "all");
        assert_eq!(case.statements().len(), 5);
        assert_eq!(case.statements()[1].class(), Some("a.B"));
        assert_eq!(case.statements()[4], Statement::Sleep { millis: 5 });
        assert!(case.resolver().is_none());
        assert!(Arc::ptr_eq(&case.proxy(), &CollectorProxy::global()));
    }

    #[test]
    fn test_change_proxy_replaces_default() {
        let mut case = ScriptedTestCase::new("t", Vec::new());
        let isolated = Arc::new(CollectorProxy::new());
        case.change_proxy(Arc::clone(&isolated));
        assert!(Arc::ptr_eq(&case.proxy(), &isolated));
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        let err = ScriptedTestCase::from_json(r#"{"name":"x","statements":[{"op":"jump"}]}"#).unwrap_err();
        assert!(err.to_string().contains("unknown variant"));
    }

    #[test]
    fn test_statement_display() {
        let invoke = Statement::Invoke {
            class: "a.B".to_string(),
            method: "run".to_string(),
        };
        assert_eq!(invoke.to_string(), "a.B.run()");
        assert_eq!(Statement::Sleep { millis: 3 }.to_string(), "sleep(3)");
    }
}
