use std::{collections::BTreeMap, fmt};

use crate::ast::{Declarations, Variable};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Bool,
    Char,
    Float,
    Void,
}

impl Type {
    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn name(self) -> &'static str {
        match self {
            Type::Int => "int",
            Type::Bool => "bool",
            Type::Char => "char",
            Type::Float => "float",
            Type::Void => "void",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps each visible variable to its static type.
///
/// A function's map is the global map overlaid with its parameters and
/// locals, so later entries shadow earlier ones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypeMap {
    map: BTreeMap<Variable, Type>,
}

impl TypeMap {
    pub fn new() -> TypeMap {
        TypeMap::default()
    }

    pub fn get(&self, var: &Variable) -> Option<Type> {
        self.map.get(var).copied()
    }

    pub fn insert(&mut self, var: Variable, ty: Type) -> Option<Type> {
        self.map.insert(var, ty)
    }

    /// Returns a copy of this map with the given declarations laid on top.
    pub fn overlay(&self, decls: &Declarations) -> TypeMap {
        let mut out = self.clone();
        for decl in decls {
            out.insert(decl.var.clone(), decl.ty);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, Type)> {
        self.map.iter().map(|(var, ty)| (var, *ty))
    }
}

impl fmt::Display for TypeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (var, ty) in self.iter() {
            writeln!(f, "{var}: {ty}")?;
        }
        Ok(())
    }
}
