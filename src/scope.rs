use crate::value::Value;
use std::collections::{BTreeMap, HashMap};

/// Ambient host names shadowed from expression evaluation. They resolve
/// to null even when the scope defines them.
const ISOLATED_NAMES: &[&str] = &["process", "window", "global", "require"];

static NULL: Value = Value::Null;

/// Name resolution during a render: the caller-supplied root mapping plus
/// a stack of loop bindings.
pub struct Scope {
    root: BTreeMap<String, Value>,
    stack: Vec<HashMap<String, Value>>,
}

impl Scope {
    /// Create a scope from root data, which must be an object.
    pub fn new(root: Value) -> Result<Self, String> {
        match root {
            Value::Object(obj) => Ok(Self {
                root: obj,
                stack: Vec::new(),
            }),
            other => Err(format!("scope must be an object, got {}", other.type_name())),
        }
    }

    /// Resolve a bare name against loop bindings first, then the root.
    pub fn resolve(&self, name: &str) -> Result<&Value, String> {
        if ISOLATED_NAMES.contains(&name) {
            return Ok(&NULL);
        }
        for bindings in self.stack.iter().rev() {
            if let Some(value) = bindings.get(name) {
                return Ok(value);
            }
        }
        self.root
            .get(name)
            .ok_or_else(|| format!("'{name}' is not defined"))
    }

    /// Push loop bindings. Shadowing outer names is allowed, the inner
    /// binding wins until popped.
    pub fn push(&mut self, bindings: HashMap<String, Value>) {
        self.stack.push(bindings);
    }

    pub fn pop(&mut self) {
        self.stack.pop();
    }
}
