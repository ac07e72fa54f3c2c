//! Registry builder: unions every snapshot into one canonical view.
//!
//! ## Environment conflicts
//!
//! For each allow-listed key the candidates `(value, tool, updatedAt)` are
//! stably sorted by `updatedAt` ascending and the **last** one wins. ISO-8601
//! strings in the canonical format compare chronologically as plain strings.
//! Equal timestamps keep their input order, so on a tie the snapshot loaded
//! last wins (see [`crate::normalize::load_all_snapshots`] for that order).
//! This is last-write-wins, not most-tools-agree.

use std::collections::BTreeMap;

use toolsync_core::{
    config::ToolSyncConfig, types::iso_now, Category, EnvEntry, ItemOwners, Registry, Snapshot,
};

/// Build the registry for `revision`, stamped with the current time.
pub fn build_registry(revision: u64, config: &ToolSyncConfig, snapshots: &[Snapshot]) -> Registry {
    build_registry_at(revision, config, snapshots, &iso_now())
}

/// [`build_registry`] with an explicit `updatedAt` stamp.
pub fn build_registry_at(
    revision: u64,
    config: &ToolSyncConfig,
    snapshots: &[Snapshot],
    now: &str,
) -> Registry {
    let mut by_type: BTreeMap<Category, ItemOwners> = BTreeMap::new();
    for category in Category::all() {
        let mut owners = ItemOwners::new();
        for snapshot in snapshots {
            for name in snapshot.items(*category) {
                owners
                    .entry(name.clone())
                    .or_default()
                    .insert(snapshot.tool.clone());
            }
        }
        by_type.insert(*category, owners);
    }

    let mut env = BTreeMap::new();
    for key in &config.allow_env_keys {
        if let Some(winner) = resolve_env(key, snapshots) {
            env.insert(key.clone(), winner);
        }
    }

    Registry {
        revision,
        updated_at: now.to_string(),
        tools: config.tools.clone(),
        by_type,
        env,
    }
}

/// Last-write-wins resolution for one env key; `None` if no snapshot sets it.
fn resolve_env(key: &str, snapshots: &[Snapshot]) -> Option<EnvEntry> {
    let mut candidates: Vec<EnvEntry> = snapshots
        .iter()
        .filter_map(|s| {
            s.env.get(key).map(|value| EnvEntry {
                value: value.clone(),
                source_tool: s.tool.clone(),
                updated_at: s.updated_at.clone(),
            })
        })
        .collect();
    // `sort_by` is stable: ties keep input order.
    candidates.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
    candidates.pop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use toolsync_core::ToolId;

    const NOW: &str = "2026-10-18T12:00:00.000Z";

    fn config(tools: &[&str], env_keys: &[&str]) -> ToolSyncConfig {
        ToolSyncConfig {
            tools: tools.iter().map(|t| ToolId::from(*t)).collect(),
            allow_env_keys: env_keys.iter().map(|k| k.to_string()).collect(),
            ..ToolSyncConfig::default()
        }
    }

    fn snap(tool: &str, updated_at: &str) -> Snapshot {
        let mut s = Snapshot::empty(ToolId::from(tool));
        s.updated_at = updated_at.to_string();
        s
    }

    #[test]
    fn items_owned_by_every_contributing_tool() {
        let mut a = snap("A", NOW);
        a.extension.insert("X".into());
        a.skill.insert("pdf".into());
        let mut b = snap("B", NOW);
        b.extension.insert("X".into());
        b.extension.insert("Y".into());

        let reg = build_registry_at(1, &config(&["A", "B"], &[]), &[a, b], NOW);
        let ext = reg.owners(Category::Extension).unwrap();
        assert_eq!(ext["X"].len(), 2);
        assert_eq!(
            ext["Y"].iter().cloned().collect::<Vec<_>>(),
            vec![ToolId::from("B")]
        );
        assert_eq!(reg.item_count(Category::Skill), 1);
        assert_eq!(reg.item_count(Category::Mcp), 0);
        assert_eq!(reg.revision, 1);
        assert_eq!(reg.updated_at, NOW);
    }

    #[rstest]
    #[case(Category::Extension)]
    #[case(Category::Mcp)]
    #[case(Category::Skill)]
    #[case(Category::TerminalTheme)]
    #[case(Category::EditorTheme)]
    fn item_listed_iff_some_snapshot_has_it(#[case] category: Category) {
        let mut a = snap("A", NOW);
        a.items_mut(category).insert("shared".into());
        a.items_mut(category).insert("only-a".into());
        let mut b = snap("B", NOW);
        b.items_mut(category).insert("shared".into());

        let reg = build_registry_at(1, &config(&["A", "B", "C"], &[]), &[a, b, snap("C", NOW)], NOW);
        let owners = reg.owners(category).unwrap();
        assert_eq!(owners.keys().collect::<Vec<_>>(), vec!["only-a", "shared"]);
        assert!(owners.values().all(|tools| !tools.is_empty()));
        assert!(!owners["shared"].contains(&ToolId::from("C")));
        for other in Category::all().iter().filter(|c| **c != category) {
            assert_eq!(reg.item_count(*other), 0);
        }
    }

    #[test]
    fn every_category_present_even_when_empty() {
        let reg = build_registry_at(1, &config(&["A"], &[]), &[], NOW);
        for c in Category::all() {
            assert!(reg.owners(*c).is_some(), "{c} missing");
        }
    }

    #[test]
    fn newer_env_value_wins_regardless_of_input_order() {
        let mut a = snap("A", "2026-10-18T10:00:00.000Z");
        a.env.insert("TZ".into(), "Europe/Paris".into());
        let mut b = snap("B", "2026-10-17T10:00:00.000Z");
        b.env.insert("TZ".into(), "UTC".into());
        let cfg = config(&["A", "B"], &["TZ"]);

        for input in [vec![a.clone(), b.clone()], vec![b, a]] {
            let reg = build_registry_at(1, &cfg, &input, NOW);
            let tz = &reg.env["TZ"];
            assert_eq!(tz.value, "Europe/Paris");
            assert_eq!(tz.source_tool, ToolId::from("A"));
            assert_eq!(tz.updated_at, "2026-10-18T10:00:00.000Z");
        }
    }

    #[test]
    fn equal_timestamps_resolve_to_last_input() {
        let mut a = snap("A", NOW);
        a.env.insert("LANG".into(), "en_US".into());
        let mut b = snap("B", NOW);
        b.env.insert("LANG".into(), "fr_FR".into());
        let reg = build_registry_at(1, &config(&["A", "B"], &["LANG"]), &[a, b], NOW);
        assert_eq!(reg.env["LANG"].source_tool, ToolId::from("B"));
    }

    #[test]
    fn only_allow_listed_keys_are_resolved() {
        let mut a = snap("A", NOW);
        a.env.insert("SECRET_TOKEN".into(), "x".into());
        a.env.insert("TZ".into(), "UTC".into());
        let reg = build_registry_at(1, &config(&["A"], &["TZ", "EDITOR"]), &[a], NOW);
        assert_eq!(reg.env.len(), 1);
        assert!(reg.env.contains_key("TZ"));
        assert!(!reg.env.contains_key("EDITOR"), "no snapshot defines EDITOR");
    }

    #[test]
    fn unconfigured_snapshots_contribute_but_are_not_listed() {
        let mut extra = snap("zed", NOW);
        extra.mcp.insert("github".into());
        let reg = build_registry_at(1, &config(&["A"], &[]), &[snap("A", NOW), extra], NOW);
        assert_eq!(reg.tools, vec![ToolId::from("A")]);
        assert!(reg.owners(Category::Mcp).unwrap()["github"].contains(&ToolId::from("zed")));
    }
}
