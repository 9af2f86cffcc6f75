//! RON catalog loader

use crate::error::{Error, Result};
use idlemmo_core::{ActivityConfig, ActivityId, Catalog, EquipmentDefinition, ItemId};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

const BUNDLED_ACTIVITIES: &str = include_str!("../data/activities.ron");
const BUNDLED_EQUIPMENT: &str = include_str!("../data/equipment.ron");

/// Loader for RON catalog files
pub struct Loader {
    catalog: Catalog,
}

impl Loader {
    /// Create a new loader
    pub fn new() -> Self {
        Self {
            catalog: Catalog::new(),
        }
    }

    /// Load a single RON file
    ///
    /// The file kind is taken from its name, falling back to its top-level field.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

        if filename.contains("activit") || content.contains("activities:") {
            self.load_activities_str(&content)
        } else if filename.contains("equipment") || content.contains("equipment:") {
            self.load_equipment_str(&content)
        } else {
            Err(Error::MissingField(format!(
                "{}: expected `activities` or `equipment`",
                path.display()
            )))
        }
    }

    /// Load activities from a RON string
    pub fn load_activities_str(&mut self, content: &str) -> Result<()> {
        #[derive(serde::Deserialize)]
        struct ActivityFile {
            activities: Vec<ActivityConfig>,
        }

        let file: ActivityFile = ron::from_str(content)?;
        for activity in file.activities {
            validate_activity(&activity)?;
            let id = activity.id.clone();
            if self.catalog.activities.contains_key(&id) {
                return Err(Error::DuplicateDefinition(id.to_string()));
            }
            self.catalog.activities.insert(id, activity);
        }
        Ok(())
    }

    /// Load equipment definitions from a RON string
    pub fn load_equipment_str(&mut self, content: &str) -> Result<()> {
        #[derive(serde::Deserialize)]
        struct EquipmentFile {
            equipment: Vec<EquipmentDefinition>,
        }

        let file: EquipmentFile = ron::from_str(content)?;
        for def in file.equipment {
            if def.id.is_empty() {
                return Err(Error::MissingField("equipment.id".to_string()));
            }
            validate_equipment(&def)?;
            let id = def.id.clone();
            if self.catalog.equipment.contains_key(&id) {
                return Err(Error::DuplicateDefinition(id.to_string()));
            }
            self.catalog.equipment.insert(id, def);
        }
        Ok(())
    }

    /// Load all RON files from a directory
    pub fn load_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if !path.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Not a directory: {:?}", path),
            )));
        }

        let mut entries: Vec<_> = fs::read_dir(path)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|e| e.path())
            .collect();
        entries.sort();

        for file_path in entries {
            if file_path.extension().map(|e| e == "ron").unwrap_or(false) {
                self.load_file(&file_path)?;
            } else if file_path.is_dir() {
                self.load_directory(&file_path)?;
            }
        }

        Ok(())
    }

    /// Finish loading and return the catalog
    pub fn finish(self) -> Catalog {
        self.catalog
    }

    /// Get the current catalog (for inspection during loading)
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Catalog shipped with the crate
pub fn bundled_catalog() -> Result<Catalog> {
    let mut loader = Loader::new();
    loader.load_activities_str(BUNDLED_ACTIVITIES)?;
    loader.load_equipment_str(BUNDLED_EQUIPMENT)?;
    Ok(loader.finish())
}

/// Equipment drops whose item has no equipment definition
///
/// Such drops still land in the inventory but can never be equipped.
pub fn unresolved_equipment_drops(catalog: &Catalog) -> Vec<(ActivityId, ItemId)> {
    catalog
        .activities
        .values()
        .flat_map(|a| {
            a.equipment_drops
                .iter()
                .filter(|d| catalog.equipment(&d.id).is_none())
                .map(move |d| (a.id.clone(), d.id.clone()))
        })
        .collect()
}

fn check_chance(id: &str, what: &str, p: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::invalid(id, format!("{} {} outside [0, 1]", what, p)));
    }
    Ok(())
}

fn check_finite(id: &str, what: &str, v: f64) -> Result<()> {
    if !v.is_finite() {
        return Err(Error::invalid(id, format!("{} {} is not finite", what, v)));
    }
    Ok(())
}

fn validate_equipment(def: &EquipmentDefinition) -> Result<()> {
    let id = def.id.as_str();
    check_finite(id, "gain_multiplier", def.attributes.gain_multiplier)?;
    check_finite(id, "rare_chance_bonus", def.attributes.rare_chance_bonus)?;
    check_finite(id, "exp_multiplier", def.attributes.exp_multiplier)
}

fn validate_activity(a: &ActivityConfig) -> Result<()> {
    if a.id.is_empty() {
        return Err(Error::MissingField("activity.id".to_string()));
    }
    let id = a.id.as_str();
    check_finite(id, "tick_interval", a.tick_interval)?;
    check_finite(id, "growth_factor", a.growth_factor)?;
    check_finite(id, "exp_rate", a.exp_rate)?;
    if a.tick_interval <= 0.0 {
        return Err(Error::invalid(id, "tick_interval must be positive"));
    }
    if a.level_up_exp <= 0 {
        return Err(Error::invalid(id, "level_up_exp must be positive"));
    }
    check_chance(id, "rare_chance", a.rare_chance)?;
    for drop in &a.drops {
        check_chance(id, "drop_chance", drop.drop_chance)?;
    }
    for drop in &a.equipment_drops {
        check_chance(id, "equipment drop_chance", drop.drop_chance)?;
    }
    for event in &a.rare_events {
        check_finite(id, "rare event mult_gain", event.mult_gain)?;
        if event.mult_gain < 0.0 {
            return Err(Error::invalid(id, format!("rare event {} has negative mult_gain", event.name)));
        }
    }

    let mut seen = HashSet::new();
    for sp in &a.sub_projects {
        if !seen.insert(&sp.id) {
            return Err(Error::DuplicateDefinition(format!("{}/{}", id, sp.id)));
        }
        check_finite(id, "gain_multiplier", sp.gain_multiplier)?;
        check_finite(id, "rare_chance_bonus", sp.rare_chance_bonus)?;
        check_finite(id, "exp_multiplier", sp.exp_multiplier)?;
        check_finite(id, "interval_modifier", sp.interval_modifier)?;
        if sp.interval_modifier < 0.0 {
            return Err(Error::invalid(id, format!("sub-project {} has negative interval_modifier", sp.id)));
        }
        for drop in &sp.extra_drops {
            check_chance(id, "extra drop_chance", drop.drop_chance)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use idlemmo_core::{Slot, SubProjectId};

    const ACTIVITIES: &str = r#"
    (
        activities: [
            (
                id: "mining",
                name: "Mining",
                base_gain: 10,
                growth_factor: 2.0,
                tick_interval: 3.0,
                level_up_exp: 100,
                drops: [(id: "ore", drop_chance: 0.5)],
                sub_projects: [(id: "deep", unlock_level: 5)],
            ),
        ]
    )
    "#;

    #[test]
    fn test_load_activities() {
        let mut loader = Loader::new();
        loader.load_activities_str(ACTIVITIES).unwrap();

        let catalog = loader.finish();
        let mining = catalog.activity(&ActivityId::new("mining")).unwrap();
        assert_eq!(mining.base_gain, 10);
        assert!(mining.sub_project(&SubProjectId::new("deep")).is_some());
    }

    #[test]
    fn test_duplicate_activity() {
        let mut loader = Loader::new();
        loader.load_activities_str(ACTIVITIES).unwrap();
        let err = loader.load_activities_str(ACTIVITIES).unwrap_err();
        assert!(matches!(err, Error::DuplicateDefinition(_)));
    }

    #[test]
    fn test_rejects_bad_chance() {
        let content = r#"
        (activities: [(id: "x", tick_interval: 1.0, level_up_exp: 10, rare_chance: 1.5)])
        "#;
        let err = Loader::new().load_activities_str(content).unwrap_err();
        assert!(matches!(err, Error::InvalidDefinition { .. }));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let content = r#"
        (activities: [(id: "x", tick_interval: 0.0, level_up_exp: 10)])
        "#;
        assert!(Loader::new().load_activities_str(content).is_err());
    }

    #[test]
    fn test_rejects_non_finite_floats() {
        let infinite_interval = r#"
        (activities: [(id: "x", tick_interval: inf, level_up_exp: 10)])
        "#;
        let err = Loader::new().load_activities_str(infinite_interval).unwrap_err();
        assert!(matches!(err, Error::InvalidDefinition { .. }));

        let nan_growth = r#"
        (activities: [(id: "x", tick_interval: 1.0, level_up_exp: 10, growth_factor: NaN)])
        "#;
        let err = Loader::new().load_activities_str(nan_growth).unwrap_err();
        assert!(matches!(err, Error::InvalidDefinition { .. }));

        let nan_modifier = r#"
        (activities: [(
            id: "x",
            tick_interval: 1.0,
            level_up_exp: 10,
            sub_projects: [(id: "a", interval_modifier: NaN)],
        )])
        "#;
        let err = Loader::new().load_activities_str(nan_modifier).unwrap_err();
        assert!(matches!(err, Error::InvalidDefinition { .. }));

        let infinite_attribute = r#"
        (equipment: [(id: "pick", slot: weapon, attributes: (gain_multiplier: inf))])
        "#;
        let err = Loader::new().load_equipment_str(infinite_attribute).unwrap_err();
        assert!(matches!(err, Error::InvalidDefinition { .. }));
    }

    #[test]
    fn test_rejects_duplicate_sub_project() {
        let content = r#"
        (activities: [(
            id: "x",
            tick_interval: 1.0,
            level_up_exp: 10,
            sub_projects: [(id: "a"), (id: "a")],
        )])
        "#;
        let err = Loader::new().load_activities_str(content).unwrap_err();
        assert!(matches!(err, Error::DuplicateDefinition(_)));
    }

    #[test]
    fn test_load_equipment() {
        let content = r#"
        (
            equipment: [
                (
                    id: "bronze_pickaxe",
                    name: "Bronze Pickaxe",
                    slot: weapon,
                    quality: uncommon,
                    attributes: (gain_multiplier: 0.1),
                ),
            ]
        )
        "#;
        let mut loader = Loader::new();
        loader.load_equipment_str(content).unwrap();
        let def = loader
            .catalog()
            .equipment(&ItemId::new("bronze_pickaxe"))
            .unwrap();
        assert_eq!(def.slot, Slot::Weapon);
    }

    #[test]
    fn test_bundled_catalog() {
        let catalog = bundled_catalog().unwrap();
        assert!(!catalog.activities.is_empty());
        assert!(!catalog.equipment.is_empty());
        assert!(unresolved_equipment_drops(&catalog).is_empty());
    }
}
