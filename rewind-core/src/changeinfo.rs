//! Decoded meaning of a commit.
//!
//! A commit message is a subject line followed by change blocks, each one a
//! `Rewind-Action: <scope>/<action>[/<id>]` trailer with optional
//! `Rewind-<Tag>: <value>` lines below it:
//!
//! ```text
//! Created post "Hello"
//!
//! Rewind-Action: post/create/42
//! Rewind-Post-Title: Hello
//! ```
//!
//! [`crate::matcher::parse`] turns a message into a [`ChangeInfo`] and
//! [`ChangeInfo::to_commit_message`] renders one back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TRAILER_PREFIX: &str = "Rewind-";
pub const ACTION_TRAILER: &str = "Rewind-Action";
pub const TOOL_SCOPE: &str = "rewind";
pub const PLUGIN_NAME_TAG: &str = "Plugin-Name";
pub const THEME_NAME_TAG: &str = "Theme-Name";

pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevertKind {
    Undo,
    Rollback,
}

impl RevertKind {
    pub fn as_str(&self) -> &str {
        match self {
            RevertKind::Undo => "undo",
            RevertKind::Rollback => "rollback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeInfo {
    /// Create/edit/delete of a mirrored entity.
    Entity {
        entity: String,
        action: String,
        id: String,
        tags: Tags,
    },
    Plugin {
        action: String,
        slug: String,
        tags: Tags,
    },
    Theme {
        action: String,
        slug: String,
        tags: Tags,
    },
    WordPressUpdate {
        version: String,
    },
    /// Undo of, or rollback to, the referenced commit.
    Revert {
        kind: RevertKind,
        commit: String,
    },
    /// Tracking switched on or off.
    Tracking {
        action: String,
    },
    Envelope {
        entries: Vec<ChangeInfo>,
    },
    /// Anything the matcher did not recognise.
    Untracked {
        description: String,
    },
}

/// Flat record of one change, as shown in the history view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    #[serde(rename = "type")]
    pub change_type: String,
    pub action: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: Tags,
}

impl ChangeInfo {
    pub fn entity(entity: impl Into<String>, action: impl Into<String>, id: impl Into<String>) -> Self {
        ChangeInfo::Entity {
            entity: entity.into(),
            action: action.into(),
            id: id.into(),
            tags: Tags::new(),
        }
    }

    pub fn revert(kind: RevertKind, commit: impl Into<String>) -> Self {
        ChangeInfo::Revert {
            kind,
            commit: commit.into(),
        }
    }

    /// Adds a tag. Has no effect on variants that carry no tags.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Some(tags) = self.tags_mut() {
            tags.insert(key.into(), value.into());
        }
        self
    }

    /// Combines several changes into one value: a single change stays as it is.
    pub fn bundle(mut entries: Vec<ChangeInfo>) -> Self {
        match entries.len() {
            0 => ChangeInfo::Untracked {
                description: String::new(),
            },
            1 => entries.remove(0),
            _ => ChangeInfo::Envelope { entries },
        }
    }

    fn tags_mut(&mut self) -> Option<&mut Tags> {
        match self {
            ChangeInfo::Entity { tags, .. }
            | ChangeInfo::Plugin { tags, .. }
            | ChangeInfo::Theme { tags, .. } => Some(tags),
            _ => None,
        }
    }

    pub fn tags(&self) -> Tags {
        match self {
            ChangeInfo::Entity { tags, .. }
            | ChangeInfo::Plugin { tags, .. }
            | ChangeInfo::Theme { tags, .. } => tags.clone(),
            _ => Tags::new(),
        }
    }

    /// The individual changes carried by this value.
    pub fn entries(&self) -> Vec<&ChangeInfo> {
        match self {
            ChangeInfo::Envelope { entries } => entries.iter().collect(),
            ChangeInfo::Untracked { .. } => Vec::new(),
            other => vec![other],
        }
    }

    /// Display rank inside an envelope; higher wins.
    fn priority(&self) -> u8 {
        match self {
            ChangeInfo::Revert { .. } => 6,
            ChangeInfo::WordPressUpdate { .. } => 5,
            ChangeInfo::Plugin { .. } | ChangeInfo::Theme { .. } => 4,
            ChangeInfo::Tracking { .. } => 3,
            ChangeInfo::Entity { .. } => 2,
            ChangeInfo::Envelope { .. } => 1,
            ChangeInfo::Untracked { .. } => 0,
        }
    }

    pub fn description(&self) -> String {
        match self {
            ChangeInfo::Entity {
                entity,
                action,
                id,
                tags,
            } => {
                let name = display_name(tags).unwrap_or(id);
                format!(
                    "{} {} \"{}\"",
                    past_tense(action),
                    entity.replace('_', " "),
                    name
                )
            }
            ChangeInfo::Plugin { action, slug, tags } => {
                let name = tags.get(PLUGIN_NAME_TAG).unwrap_or(slug);
                format!("{} plugin \"{}\"", past_tense(action), name)
            }
            ChangeInfo::Theme { action, slug, tags } => {
                let name = tags.get(THEME_NAME_TAG).unwrap_or(slug);
                if action == "switch" {
                    format!("Switched to theme \"{}\"", name)
                } else {
                    format!("{} theme \"{}\"", past_tense(action), name)
                }
            }
            ChangeInfo::WordPressUpdate { version } => {
                format!("WordPress updated to version {}", version)
            }
            ChangeInfo::Revert { kind, commit } => {
                let short: String = commit.chars().take(7).collect();
                match kind {
                    RevertKind::Undo => format!("Reverted change {}", short),
                    RevertKind::Rollback => format!("Rolled back to {}", short),
                }
            }
            ChangeInfo::Tracking { action } => format!("Tracking {}", past_tense(action).to_lowercase()),
            ChangeInfo::Envelope { entries } => {
                // max_by_key keeps the last maximum, so search reversed to keep the first
                entries
                    .iter()
                    .rev()
                    .max_by_key(|entry| entry.priority())
                    .map(ChangeInfo::description)
                    .unwrap_or_default()
            }
            ChangeInfo::Untracked { description } => {
                if description.trim().is_empty() {
                    "(no message)".to_string()
                } else {
                    description.clone()
                }
            }
        }
    }

    pub fn summaries(&self) -> Vec<ChangeSummary> {
        self.entries()
            .into_iter()
            .filter_map(ChangeInfo::summary)
            .collect()
    }

    fn summary(&self) -> Option<ChangeSummary> {
        let (change_type, action, name) = match self {
            ChangeInfo::Entity {
                entity, action, id, ..
            } => (entity.as_str(), action.as_str(), id.clone()),
            ChangeInfo::Plugin { action, slug, tags } => (
                "plugin",
                action.as_str(),
                tags.get(PLUGIN_NAME_TAG).unwrap_or(slug).clone(),
            ),
            ChangeInfo::Theme { action, slug, tags } => (
                "theme",
                action.as_str(),
                tags.get(THEME_NAME_TAG).unwrap_or(slug).clone(),
            ),
            ChangeInfo::WordPressUpdate { version } => ("wordpress", "update", version.clone()),
            ChangeInfo::Revert { kind, commit } => (TOOL_SCOPE, kind.as_str(), commit.clone()),
            ChangeInfo::Tracking { action } => (TOOL_SCOPE, action.as_str(), String::new()),
            ChangeInfo::Envelope { .. } | ChangeInfo::Untracked { .. } => return None,
        };

        Some(ChangeSummary {
            change_type: change_type.to_string(),
            action: action.to_string(),
            name,
            tags: self.tags(),
        })
    }

    fn action_value(&self) -> Option<String> {
        match self {
            ChangeInfo::Entity {
                entity, action, id, ..
            } => Some(format!("{}/{}/{}", entity, action, id)),
            ChangeInfo::Plugin { action, slug, .. } => Some(format!("plugin/{}/{}", action, slug)),
            ChangeInfo::Theme { action, slug, .. } => Some(format!("theme/{}/{}", action, slug)),
            ChangeInfo::WordPressUpdate { version } => Some(format!("wordpress/update/{}", version)),
            ChangeInfo::Revert { kind, commit } => {
                Some(format!("{}/{}/{}", TOOL_SCOPE, kind.as_str(), commit))
            }
            ChangeInfo::Tracking { action } => Some(format!("{}/{}", TOOL_SCOPE, action)),
            ChangeInfo::Envelope { .. } | ChangeInfo::Untracked { .. } => None,
        }
    }

    fn render_block(&self) -> Option<String> {
        let action = self.action_value()?;
        let mut block = format!("{}: {}", ACTION_TRAILER, action);
        for (key, value) in self.tags() {
            block.push_str(&format!(
                "\n{}{}: {}",
                TRAILER_PREFIX,
                key,
                value.replace(['\r', '\n'], " ")
            ));
        }
        Some(block)
    }

    pub fn to_commit_message(&self) -> String {
        let blocks: Vec<String> = self
            .entries()
            .into_iter()
            .filter_map(ChangeInfo::render_block)
            .collect();

        if blocks.is_empty() {
            return self.description();
        }

        format!("{}\n\n{}", self.description(), blocks.join("\n\n"))
    }
}

fn display_name(tags: &Tags) -> Option<&String> {
    tags.iter()
        .find(|(key, _)| key.ends_with("-Title") || key.ends_with("-Name"))
        .map(|(_, value)| value)
}

fn past_tense(action: &str) -> String {
    match action {
        "create" => "Created".to_string(),
        "edit" => "Edited".to_string(),
        "delete" => "Deleted".to_string(),
        "trash" => "Trashed".to_string(),
        "untrash" => "Restored".to_string(),
        "install" => "Installed".to_string(),
        "activate" => "Activated".to_string(),
        "deactivate" => "Deactivated".to_string(),
        "update" => "Updated".to_string(),
        other => {
            let mut chars = other.chars();
            let head: String = chars.next().map(|c| c.to_uppercase().collect()).unwrap_or_default();
            let rest: String = chars.collect();
            if other.ends_with('e') {
                format!("{}{}d", head, rest)
            } else {
                format!("{}{}ed", head, rest)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_description_prefers_title_tag() {
        let info = ChangeInfo::entity("post", "create", "42").with_tag("Post-Title", "Hello");
        assert_eq!(info.description(), "Created post \"Hello\"");

        let untitled = ChangeInfo::entity("term_taxonomy", "edit", "7");
        assert_eq!(untitled.description(), "Edited term taxonomy \"7\"");
    }

    #[test]
    fn test_unknown_actions_get_generic_verbs() {
        assert_eq!(past_tense("approve"), "Approved");
        assert_eq!(past_tense("publish"), "Published");
    }

    #[test]
    fn test_plugin_and_theme_names() {
        let plugin = ChangeInfo::Plugin {
            action: "activate".to_string(),
            slug: "akismet/akismet.php".to_string(),
            tags: Tags::new(),
        }
        .with_tag(PLUGIN_NAME_TAG, "Akismet");
        assert_eq!(plugin.description(), "Activated plugin \"Akismet\"");
        assert_eq!(plugin.summaries()[0].name, "Akismet");

        let theme = ChangeInfo::Theme {
            action: "switch".to_string(),
            slug: "twentyfifteen".to_string(),
            tags: Tags::new(),
        };
        assert_eq!(theme.description(), "Switched to theme \"twentyfifteen\"");
    }

    #[test]
    fn test_envelope_describes_highest_priority_entry() {
        let envelope = ChangeInfo::bundle(vec![
            ChangeInfo::entity("option", "edit", "blogname"),
            ChangeInfo::WordPressUpdate {
                version: "4.5".to_string(),
            },
            ChangeInfo::entity("post", "edit", "1"),
        ]);

        assert_eq!(envelope.description(), "WordPress updated to version 4.5");
        assert_eq!(envelope.entries().len(), 3);
        assert_eq!(envelope.summaries()[1].change_type, "wordpress");
    }

    #[test]
    fn test_envelope_tie_keeps_first_entry() {
        let envelope = ChangeInfo::bundle(vec![
            ChangeInfo::entity("post", "create", "1"),
            ChangeInfo::entity("post", "create", "2"),
        ]);
        assert_eq!(envelope.description(), "Created post \"1\"");
    }

    #[test]
    fn test_revert_message_rendering() {
        let hash = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        let info = ChangeInfo::revert(RevertKind::Rollback, hash);

        assert_eq!(info.description(), "Rolled back to 0123456");
        assert_eq!(
            info.to_commit_message(),
            format!("Rolled back to 0123456\n\nRewind-Action: rewind/rollback/{}", hash)
        );
    }

    #[test]
    fn test_untracked_has_no_summaries() {
        let info = ChangeInfo::Untracked {
            description: "manual edit".to_string(),
        };
        assert!(info.summaries().is_empty());
        assert_eq!(info.to_commit_message(), "manual edit");
    }
}
