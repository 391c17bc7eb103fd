//! Post payload validation.

use std::collections::BTreeMap;

use time::{format_description::FormatItem, macros::format_description};

pub const TITLE_MAX_CHARS: usize = 100;

const NULL_CHARACTERS_MESSAGE: &str = "Null characters are not allowed.";

pub const HUMAN_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[month repr:long] [day padding:none], [year]");

/// Raw title and content as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostInput {
    pub title: String,
    pub content: String,
}

/// Title and content that passed validation, trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidPost {
    pub title: String,
    pub content: String,
}

/// Field name to messages, in a stable order for rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    fields: BTreeMap<&'static str, Vec<String>>,
}

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.keys().copied()
    }
}

impl PostInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    pub fn validate(&self) -> Result<ValidPost, FieldErrors> {
        let title = self.title.trim();
        let content = self.content.trim();
        let mut errors = FieldErrors::default();

        if title.is_empty() {
            errors.add("title", "This field is required.");
        } else {
            let length = title.chars().count();
            if length > TITLE_MAX_CHARS {
                errors.add(
                    "title",
                    format!(
                        "Ensure this value has at most {TITLE_MAX_CHARS} characters (it has {length})."
                    ),
                );
            }
        }

        if content.is_empty() {
            errors.add("content", "This field is required.");
        }

        // Postgres text columns cannot store NUL.
        if title.contains('\0') {
            errors.add("title", NULL_CHARACTERS_MESSAGE);
        }
        if content.contains('\0') {
            errors.add("content", NULL_CHARACTERS_MESSAGE);
        }

        if errors.is_empty() {
            Ok(ValidPost {
                title: title.to_string(),
                content: content.to_string(),
            })
        } else {
            Err(errors)
        }
    }
}
