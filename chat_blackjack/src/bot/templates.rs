//! Reply templates: fixed texts with inline keyboards, loaded once at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::errors::{DispatchError, DispatchResult};
use crate::game::TemplateKey;

const DEFAULT_TEMPLATES: &str = include_str!("../../templates/reply_templates.json");

/// One keyboard button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub text: String,
    pub callback_data: String,
}

/// Inline keyboard: rows of buttons
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Markup {
    pub inline_keyboard: Vec<Vec<Button>>,
}

/// Text and optional keyboard of a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyContent {
    pub text: String,
    #[serde(default)]
    pub markup: Option<Markup>,
}

#[derive(Deserialize)]
struct TemplateEntry {
    name: String,
    content: ReplyContent,
}

#[derive(Deserialize)]
struct TemplateFile {
    data: Vec<TemplateEntry>,
}

/// Immutable set of reply templates
#[derive(Debug, Clone)]
pub struct ReplyTemplates {
    by_key: HashMap<TemplateKey, ReplyContent>,
}

impl ReplyTemplates {
    /// Parse templates from their JSON document
    ///
    /// Entries with unknown names are skipped.
    pub fn from_json(json: &str) -> DispatchResult<Self> {
        let file: TemplateFile =
            serde_json::from_str(json).map_err(|e| DispatchError::Templates(e.to_string()))?;

        let mut by_key = HashMap::new();
        for entry in file.data {
            match TemplateKey::ALL.iter().find(|key| key.as_str() == entry.name) {
                Some(key) => {
                    by_key.insert(*key, entry.content);
                }
                None => log::warn!("Ignoring unknown reply template {}", entry.name),
            }
        }

        Ok(Self { by_key })
    }

    /// Load templates from a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> DispatchResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| DispatchError::Templates(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Templates bundled with the crate
    pub fn bundled() -> DispatchResult<Self> {
        Self::from_json(DEFAULT_TEMPLATES)
    }

    pub fn get(&self, key: TemplateKey) -> DispatchResult<&ReplyContent> {
        self.by_key
            .get(&key)
            .ok_or(DispatchError::TemplateNotFound(key))
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::router::{Query, Route};
    use crate::bot::update::UpdateKind;

    #[test]
    fn test_bundled_templates_cover_every_key() {
        let templates = ReplyTemplates::bundled().unwrap();
        for key in TemplateKey::ALL {
            assert!(templates.get(key).is_ok(), "{key} missing");
        }
    }

    #[test]
    fn test_bundled_buttons_are_routable() {
        let templates = ReplyTemplates::bundled().unwrap();
        for key in TemplateKey::ALL {
            let Some(markup) = &templates.get(key).unwrap().markup else {
                continue;
            };
            for button in markup.inline_keyboard.iter().flatten() {
                let route = Route::parse(&UpdateKind::Callback(button.callback_data.clone()));
                assert!(
                    matches!(route, Ok(Route::Query(_))),
                    "{} is not routable",
                    button.callback_data
                );
            }
        }
    }

    #[test]
    fn test_turn_keyboard_offers_both_actions() {
        let templates = ReplyTemplates::bundled().unwrap();
        let markup = templates
            .get(TemplateKey::GetCardOrEnough)
            .unwrap()
            .markup
            .clone()
            .unwrap();
        let routes: Vec<_> = markup
            .inline_keyboard
            .iter()
            .flatten()
            .map(|b| Route::parse(&UpdateKind::Callback(b.callback_data.clone())).unwrap())
            .collect();
        assert!(routes.contains(&Route::Query(Query::GetCard)));
        assert!(routes.contains(&Route::Query(Query::Enough)));
    }

    #[test]
    fn test_missing_template_is_not_found() {
        let templates = ReplyTemplates::from_json(r#"{"data": []}"#).unwrap();
        assert!(templates.is_empty());
        assert!(matches!(
            templates.get(TemplateKey::Inviting),
            Err(DispatchError::TemplateNotFound(TemplateKey::Inviting))
        ));
    }

    #[test]
    fn test_malformed_document_rejected() {
        assert!(matches!(
            ReplyTemplates::from_json("{\"data\": 3}"),
            Err(DispatchError::Templates(_))
        ));
    }
}
