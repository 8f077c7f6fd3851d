use std::path::Path;

use crate::error::ReviewPulseError;
use crate::types::Entity;

/// Partner credential shared by the built-in entities.
const DEFAULT_PARTNER_ID: &str = "1798";

/// Built-in entity list: (upstream id, name). Table id equals the name.
const BUILTIN_ENTITIES: &[(&str, &str)] = &[
    ("291dac76-4fe2-3336-9c5d-709261abf797", "Reischlhof"),
    ("6a4eafbc-97a7-31dd-9d02-d1bb9dc0b254", "Riedlberg"),
    ("faaad7bb-bd76-396c-af45-d00a661e4e53", "Obermueller"),
    ("cb227542-f4e1-3431-963e-d6555dd926af", "Bierhotel"),
    ("5baafa11-117b-3ae6-b8c1-122bf7c8b04b", "Brunnerhof"),
    ("59bcddbc-2721-3961-a258-1e8c70140867", "Jagdhof"),
    ("d73f9af8-e34a-386c-b3fb-8b463302c6d3", "Waldeck"),
    ("e870c59d-4507-3257-8b01-5dc487621b8e", "Ulrichshof"),
];

/// Static list of tracked entities, loaded once at process start.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    entities: Vec<Entity>,
}

impl EntityRegistry {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self { entities }
    }

    /// The compiled-in entity list.
    pub fn builtin() -> Self {
        let entities = BUILTIN_ENTITIES
            .iter()
            .map(|(id, name)| Entity {
                id: id.to_string(),
                name: name.to_string(),
                partner_id: DEFAULT_PARTNER_ID.to_string(),
                table_id: name.to_string(),
            })
            .collect();
        Self { entities }
    }

    /// Load a JSON array of entities, replacing the built-in list.
    pub fn from_json_file(path: &Path) -> Result<Self, ReviewPulseError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ReviewPulseError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ReviewPulseError> {
        let entities: Vec<Entity> = serde_json::from_str(raw)
            .map_err(|e| ReviewPulseError::Config(format!("invalid entity list: {e}")))?;
        if entities.is_empty() {
            return Err(ReviewPulseError::Config("entity list is empty".into()));
        }
        Ok(Self { entities })
    }

    /// Use `path` when given, the built-in list otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ReviewPulseError> {
        match path {
            Some(path) => Self::from_json_file(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn all(&self) -> &[Entity] {
        &self.entities
    }

    /// Entities matching `name` exactly, or all of them when no filter is given.
    /// A filter that matches nothing is a configuration error.
    pub fn select(&self, name: Option<&str>) -> Result<Vec<Entity>, ReviewPulseError> {
        let Some(name) = name else {
            return Ok(self.entities.clone());
        };

        let selected: Vec<Entity> = self
            .entities
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect();

        if selected.is_empty() {
            return Err(ReviewPulseError::Config(format!(
                "no entity named \"{name}\""
            )));
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_entities_use_name_as_table() {
        let registry = EntityRegistry::builtin();
        assert_eq!(registry.all().len(), BUILTIN_ENTITIES.len());
        for entity in registry.all() {
            assert_eq!(entity.table_id, entity.name);
            assert_eq!(entity.partner_id, DEFAULT_PARTNER_ID);
        }
    }

    #[test]
    fn select_without_filter_returns_everything() {
        let registry = EntityRegistry::builtin();
        assert_eq!(registry.select(None).unwrap().len(), registry.all().len());
    }

    #[test]
    fn select_by_name_is_exact() {
        let registry = EntityRegistry::builtin();
        let selected = registry.select(Some("Jagdhof")).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "59bcddbc-2721-3961-a258-1e8c70140867");

        assert!(registry.select(Some("jagdhof")).is_err());
    }

    #[test]
    fn unknown_filter_is_config_error() {
        let registry = EntityRegistry::builtin();
        let err = registry.select(Some("Nowhere")).unwrap_err();
        assert!(matches!(err, ReviewPulseError::Config(_)));
    }

    #[test]
    fn json_list_replaces_builtin() {
        let registry = EntityRegistry::from_json(
            r#"[{"id": "x1", "name": "Seehof", "partnerId": "42", "tableId": "Seehof_Reviews"}]"#,
        )
        .unwrap();
        assert_eq!(registry.all().len(), 1);
        assert_eq!(registry.all()[0].table_id, "Seehof_Reviews");
    }

    #[test]
    fn empty_json_list_rejected() {
        assert!(EntityRegistry::from_json("[]").is_err());
    }
}
