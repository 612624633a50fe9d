use crate::ast::{FieldDef, ResolutionState, Schema};
use crate::error::{At, MaxiError, SourceRef};
use log::debug;
use std::collections::HashMap;

/// Merges inherited fields into every type of a schema.
///
/// Parents are resolved depth first. Fields are inherited in parent declaration
/// order, the earliest parent winning a name conflict, and the type's own fields
/// then replace inherited ones in place or are appended.
#[derive(Debug, Default)]
pub struct Resolver<'a> {
    root: Option<SourceRef<'a>>,
    imports: Option<&'a HashMap<String, String>>,
}

impl<'a> Resolver<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver that can point diagnostics at the document and imported texts.
    pub(crate) fn with_sources(root: SourceRef<'a>, imports: &'a HashMap<String, String>) -> Self {
        Resolver {
            root: Some(root),
            imports: Some(imports),
        }
    }

    pub fn resolve(&self, schema: &mut Schema) -> Result<(), MaxiError> {
        let mut stack = Vec::new();
        for i in 0..schema.types.len() {
            self.resolve_at(schema, i, &mut stack)?;
        }
        debug!("resolved inheritance for {} types", schema.types.len());
        Ok(())
    }

    /// Resolves a single type and its ancestors. Resolving an already resolved type
    /// leaves it untouched.
    pub fn resolve_type(&self, schema: &mut Schema, alias: &str) -> Result<(), MaxiError> {
        match schema.position(alias) {
            Some(index) => self.resolve_at(schema, index, &mut Vec::new()),
            None => Ok(()),
        }
    }

    /// `stack` holds the types currently marked `Resolving`, outermost first.
    fn resolve_at(
        &self,
        schema: &mut Schema,
        index: usize,
        stack: &mut Vec<usize>,
    ) -> Result<(), MaxiError> {
        match schema.types[index].state {
            ResolutionState::Resolved => return Ok(()),
            ResolutionState::Resolving => {
                let start = stack.iter().position(|&i| i == index).unwrap_or(0);
                let cycle = stack[start..]
                    .iter()
                    .chain(std::iter::once(&index))
                    .map(|&i| schema.types[i].alias.clone())
                    .collect();
                let at = self.locate(schema, index);
                return Err(MaxiError::CircularInheritance {
                    alias: schema.types[index].alias.clone(),
                    cycle,
                    src: at.src,
                    span: at.span,
                    line: at.line,
                    column: at.column,
                });
            }
            ResolutionState::Unresolved => {}
        }
        schema.types[index].state = ResolutionState::Resolving;
        stack.push(index);

        let parents = schema.types[index].parents.clone();
        let mut parent_indices = Vec::with_capacity(parents.len());
        for parent in &parents {
            let Some(parent_index) = schema.position(parent) else {
                let at = self.locate(schema, index);
                return Err(MaxiError::UndefinedParent {
                    alias: schema.types[index].alias.clone(),
                    parent: parent.clone(),
                    src: at.src,
                    span: at.span,
                    line: at.line,
                    column: at.column,
                });
            };
            self.resolve_at(schema, parent_index, stack)?;
            parent_indices.push(parent_index);
        }

        let mut merged: Vec<FieldDef> = Vec::new();
        for parent_index in parent_indices {
            for field in &schema.types[parent_index].fields {
                if !merged.iter().any(|f| f.name == field.name) {
                    merged.push(field.clone());
                }
            }
        }
        let type_def = &mut schema.types[index];
        for own in &type_def.declared_fields {
            match merged.iter_mut().find(|f| f.name == own.name) {
                Some(slot) => *slot = own.clone(),
                None => merged.push(own.clone()),
            }
        }
        type_def.fields = merged;
        type_def.state = ResolutionState::Resolved;
        stack.pop();
        Ok(())
    }

    fn locate(&self, schema: &Schema, index: usize) -> At {
        let type_def = &schema.types[index];
        let len = type_def.alias.len();
        match (&type_def.origin, self.root, self.imports) {
            (None, Some(root), _) => root.at(type_def.offset, len),
            (Some(origin), _, Some(imports)) if imports.contains_key(origin) => {
                SourceRef::new(origin, &imports[origin]).at(type_def.offset, len)
            }
            (origin, _, _) => {
                let name = origin.as_deref().unwrap_or("schema");
                let mut at = SourceRef::new(name, "").at(0, 0);
                at.line = type_def.line;
                at
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeDef;
    use crate::error::ErrorCode;

    fn type_def(alias: &str, parents: &[&str], fields: &[&str]) -> TypeDef {
        let mut t = TypeDef::new(alias);
        t.parents = parents.iter().map(|p| p.to_string()).collect();
        t.declared_fields = fields.iter().map(|f| FieldDef::new(*f)).collect();
        t.fields = t.declared_fields.clone();
        t
    }

    fn names(schema: &Schema, alias: &str) -> Vec<String> {
        schema
            .get(alias)
            .unwrap()
            .fields
            .iter()
            .map(|f| f.name.clone())
            .collect()
    }

    #[test]
    fn test_child_fields_overlay_parent_in_place() {
        let mut schema = Schema::new();
        schema.insert(type_def("B", &[], &["id", "name", "kind"])).unwrap();
        schema.insert(type_def("C", &["B"], &["extra", "name"])).unwrap();
        Resolver::new().resolve(&mut schema).unwrap();
        assert_eq!(names(&schema, "C"), vec!["id", "name", "kind", "extra"]);
    }

    #[test]
    fn test_earliest_parent_wins() {
        let mut schema = Schema::new();
        let mut a = type_def("A", &[], &["x"]);
        a.declared_fields[0].type_expr = Some("int".into());
        a.fields = a.declared_fields.clone();
        let mut b = type_def("B", &[], &["x", "y"]);
        b.declared_fields[0].type_expr = Some("str".into());
        b.fields = b.declared_fields.clone();
        schema.insert(a).unwrap();
        schema.insert(b).unwrap();
        schema.insert(type_def("C", &["A", "B"], &[])).unwrap();
        Resolver::new().resolve(&mut schema).unwrap();
        let c = schema.get("C").unwrap();
        assert_eq!(names(&schema, "C"), vec!["x", "y"]);
        assert_eq!(c.fields[0].type_expr.as_deref(), Some("int"));
    }

    #[test]
    fn test_parent_declared_after_child() {
        let mut schema = Schema::new();
        schema.insert(type_def("C", &["P"], &["c"])).unwrap();
        schema.insert(type_def("P", &["G"], &["p"])).unwrap();
        schema.insert(type_def("G", &[], &["g"])).unwrap();
        Resolver::new().resolve(&mut schema).unwrap();
        assert_eq!(names(&schema, "C"), vec!["g", "p", "c"]);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut schema = Schema::new();
        schema.insert(type_def("B", &[], &["a"])).unwrap();
        schema.insert(type_def("C", &["B"], &["b"])).unwrap();
        let resolver = Resolver::new();
        resolver.resolve(&mut schema).unwrap();
        let first = schema.get("C").unwrap().clone();
        resolver.resolve_type(&mut schema, "C").unwrap();
        resolver.resolve(&mut schema).unwrap();
        assert_eq!(schema.get("C").unwrap(), &first);
    }

    #[test]
    fn test_circular_inheritance() {
        for order in [["A", "B"], ["B", "A"]] {
            let mut schema = Schema::new();
            for alias in order {
                let parent = if alias == "A" { "B" } else { "A" };
                schema.insert(type_def(alias, &[parent], &["f"])).unwrap();
            }
            let err = Resolver::new().resolve(&mut schema).unwrap_err();
            assert_eq!(err.code(), ErrorCode::CircularInheritance);
        }
    }

    #[test]
    fn test_self_inheritance_is_circular() {
        let mut schema = Schema::new();
        schema.insert(type_def("A", &["A"], &[])).unwrap();
        let err = Resolver::new().resolve(&mut schema).unwrap_err();
        assert!(matches!(err, MaxiError::CircularInheritance { ref alias, .. } if alias == "A"));
    }

    #[test]
    fn test_circular_inheritance_reports_the_cycle_path() {
        let mut schema = Schema::new();
        schema.insert(type_def("Root", &["A"], &[])).unwrap();
        schema.insert(type_def("A", &["B"], &[])).unwrap();
        schema.insert(type_def("B", &["C"], &[])).unwrap();
        schema.insert(type_def("C", &["A"], &[])).unwrap();
        let err = Resolver::new().resolve(&mut schema).unwrap_err();
        match &err {
            MaxiError::CircularInheritance { alias, cycle, .. } => {
                assert_eq!(alias, "A");
                assert_eq!(cycle, &vec!["A", "B", "C", "A"]);
            }
            other => panic!("expected circular inheritance, got {other:?}"),
        }
        assert!(err.to_string().ends_with("A -> B -> C -> A"), "{err}");
    }

    #[test]
    fn test_undefined_parent() {
        let mut schema = Schema::new();
        schema.insert(type_def("A", &["Missing"], &[])).unwrap();
        let err = Resolver::new().resolve(&mut schema).unwrap_err();
        match err {
            MaxiError::UndefinedParent { alias, parent, .. } => {
                assert_eq!(alias, "A");
                assert_eq!(parent, "Missing");
            }
            other => panic!("expected undefined parent, got {other:?}"),
        }
    }
}
