//! Card descriptors and their validation.
//!
//! [`CardSpec`] is the loose, developer-facing descriptor (it deserializes
//! from the same JSON shape the platform uses). [`CardSpec::validate`]
//! turns it into a [`Card`] ready for the response document, enforcing the
//! required fields of each kind and stripping markup from display text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ssml;

/// Card variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardKind {
    #[default]
    Simple,
    Standard,
    LinkAccount,
}

/// Card image URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_image_url: Option<String>,
}

/// Developer-supplied card descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSpec {
    #[serde(rename = "type", default)]
    pub kind: CardKind,

    #[serde(default)]
    pub title: Option<String>,

    /// Body of a Simple card.
    #[serde(default)]
    pub content: Option<String>,

    /// Body of a Standard card.
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub image: Option<CardImage>,
}

impl CardSpec {
    pub fn simple(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: CardKind::Simple,
            title: Some(title.into()),
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn standard(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: CardKind::Standard,
            title: Some(title.into()),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_image(mut self, small: Option<String>, large: Option<String>) -> Self {
        self.image = Some(CardImage {
            small_image_url: small,
            large_image_url: large,
        });
        self
    }

    /// Check required fields and produce a sanitized card.
    pub fn validate(&self) -> Result<Card, CardError> {
        let title = self.title.as_deref().map(ssml::cleanse);
        match self.kind {
            CardKind::Simple => {
                let content = self.content.as_deref().ok_or(CardError::MissingContent)?;
                Ok(Card::Simple {
                    title,
                    content: ssml::cleanse(content),
                })
            }
            CardKind::Standard => {
                let text = self.text.as_deref().ok_or(CardError::MissingText)?;
                if let Some(image) = &self.image {
                    if image.small_image_url.is_none() && image.large_image_url.is_none() {
                        return Err(CardError::ImageWithoutUrl);
                    }
                }
                Ok(Card::Standard {
                    title,
                    text: ssml::cleanse(text),
                    image: self.image.clone(),
                })
            }
            CardKind::LinkAccount => Ok(Card::LinkAccount),
        }
    }
}

/// Why a card descriptor was rejected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardError {
    #[error("Simple card requires content")]
    MissingContent,

    #[error("Standard card requires text")]
    MissingText,

    #[error("Standard card image requires smallImageUrl or largeImageUrl")]
    ImageWithoutUrl,
}

/// Card as written into the response document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Card {
    Simple {
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        content: String,
    },
    Standard {
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        image: Option<CardImage>,
    },
    LinkAccount,
}
