use std::{collections::BTreeMap, fmt};

use crate::{ast::Variable, value::Value};

/// The values of the variables of a scope, ordered by name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct State {
    map: BTreeMap<Variable, Value>,
}

impl State {
    pub fn new() -> State {
        State::default()
    }

    /// Returns the state with `var` bound to `value`, replacing any earlier
    /// binding.
    #[must_use]
    pub fn onion(mut self, var: Variable, value: Value) -> State {
        self.map.insert(var, value);
        self
    }

    /// Returns the state with every binding of `other` laid on top.
    #[must_use]
    pub fn merge(mut self, other: State) -> State {
        self.map.extend(other.map);
        self
    }

    pub fn get(&self, var: &Variable) -> Option<Value> {
        self.map.get(var).copied()
    }

    pub fn get_mut(&mut self, var: &Variable) -> Option<&mut Value> {
        self.map.get_mut(var)
    }

    pub fn contains(&self, var: &Variable) -> bool {
        self.map.contains_key(var)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, Value)> {
        self.map.iter().map(|(var, value)| (var, *value))
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (var, value) in self.iter() {
            writeln!(f, "{var}: {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{token::Span, types::Type};

    fn var(name: &str) -> Variable {
        Variable::new(name, Span::default())
    }

    #[test]
    fn onion_overwrites() {
        let state = State::new()
            .onion(var("x"), Value::Int(1))
            .onion(var("y"), Value::undefined(Type::Bool))
            .onion(var("x"), Value::Int(2));
        assert_eq!(state.len(), 2);
        assert_eq!(state.get(&var("x")), Some(Value::Int(2)));
        assert_eq!(state.to_string(), "x: 2\ny: undef bool\n");
    }

    #[test]
    fn merge_prefers_other() {
        let globals = State::new()
            .onion(var("g"), Value::Float(1.0))
            .onion(var("x"), Value::Int(1));
        let frame = State::new().onion(var("x"), Value::Char('x'));
        let merged = globals.merge(frame);
        assert_eq!(merged.to_string(), "g: 1.0\nx: 'x'\n");
    }
}
