//! Turns commit messages into [`ChangeInfo`] values.
//!
//! Every change block in a message is offered to the [`MATCHERS`] table in
//! order; the first row whose predicate accepts the block builds the value.
//! Parsing never fails: a message without recognisable blocks becomes
//! [`ChangeInfo::Untracked`].

use crate::changeinfo::{ChangeInfo, RevertKind, Tags, ACTION_TRAILER, TOOL_SCOPE, TRAILER_PREFIX};

/// One `Rewind-Action` trailer and the tags that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBlock {
    pub scope: String,
    pub action: String,
    pub id: Option<String>,
    pub tags: Tags,
}

impl ChangeBlock {
    fn from_action(value: &str) -> Option<Self> {
        let mut parts = value.trim().splitn(3, '/');
        let scope = parts.next().filter(|s| !s.is_empty())?;
        let action = parts.next().filter(|s| !s.is_empty())?;
        let id = parts.next().filter(|s| !s.is_empty());

        Some(Self {
            scope: scope.to_string(),
            action: action.to_string(),
            id: id.map(str::to_string),
            tags: Tags::new(),
        })
    }

    fn id(&self) -> String {
        self.id.clone().unwrap_or_default()
    }
}

pub struct Matcher {
    pub name: &'static str,
    pub accepts: fn(&ChangeBlock) -> bool,
    pub build: fn(ChangeBlock) -> ChangeInfo,
}

/// Tried top to bottom; the entity row is the catch-all for structured actions.
pub static MATCHERS: &[Matcher] = &[
    Matcher {
        name: "revert",
        accepts: |b| {
            b.scope == TOOL_SCOPE && matches!(b.action.as_str(), "undo" | "rollback") && b.id.is_some()
        },
        build: |b| {
            let kind = if b.action == "undo" {
                RevertKind::Undo
            } else {
                RevertKind::Rollback
            };
            ChangeInfo::revert(kind, b.id())
        },
    },
    Matcher {
        name: "tracking",
        accepts: |b| b.scope == TOOL_SCOPE && matches!(b.action.as_str(), "activate" | "deactivate"),
        build: |b| ChangeInfo::Tracking { action: b.action },
    },
    Matcher {
        name: "plugin",
        accepts: |b| b.scope == "plugin" && b.id.is_some(),
        build: |b| ChangeInfo::Plugin {
            slug: b.id(),
            action: b.action,
            tags: b.tags,
        },
    },
    Matcher {
        name: "theme",
        accepts: |b| b.scope == "theme" && b.id.is_some(),
        build: |b| ChangeInfo::Theme {
            slug: b.id(),
            action: b.action,
            tags: b.tags,
        },
    },
    Matcher {
        name: "wordpress-update",
        accepts: |b| b.scope == "wordpress" && b.action == "update" && b.id.is_some(),
        build: |b| ChangeInfo::WordPressUpdate { version: b.id() },
    },
    Matcher {
        name: "entity",
        accepts: |b| b.scope != TOOL_SCOPE && b.id.is_some(),
        build: |b| ChangeInfo::Entity {
            id: b.id(),
            entity: b.scope,
            action: b.action,
            tags: b.tags,
        },
    },
];

/// Splits a message into change blocks. Malformed trailers are skipped.
pub fn parse_blocks(message: &str) -> Vec<ChangeBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<ChangeBlock> = None;

    for line in message.lines().map(str::trim) {
        if line.is_empty() {
            blocks.extend(current.take());
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };

        if key == ACTION_TRAILER {
            blocks.extend(current.take());
            current = ChangeBlock::from_action(value);
        } else if let (Some(tag), Some(block)) = (key.strip_prefix(TRAILER_PREFIX), current.as_mut()) {
            block.tags.insert(tag.to_string(), value.trim().to_string());
        }
    }

    blocks.extend(current);
    blocks
}

fn build(block: ChangeBlock) -> Option<ChangeInfo> {
    let matcher = MATCHERS.iter().find(|m| (m.accepts)(&block))?;
    tracing::trace!(matcher = matcher.name, scope = %block.scope, "matched change block");
    Some((matcher.build)(block))
}

/// Decodes a commit message. Total: unknown input yields `Untracked`.
pub fn parse(message: &str) -> ChangeInfo {
    let entries: Vec<ChangeInfo> = parse_blocks(message).into_iter().filter_map(build).collect();

    if entries.is_empty() {
        let subject = message.lines().next().unwrap_or("").trim();
        return ChangeInfo::Untracked {
            description: subject.to_string(),
        };
    }

    ChangeInfo::bundle(entries)
}
