use crate::domain::balance::GrowId;
use crate::domain::interaction::ActionKind;
use crate::domain::product::Product;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Embed accent colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Success,
    Error,
    Warning,
    Info,
}

impl Tone {
    pub fn color(&self) -> u32 {
        match self {
            Tone::Success => 0x00_ff00,
            Tone::Error => 0xff_0000,
            Tone::Warning => 0xff_a500,
            Tone::Info => 0x34_98db,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub description: Option<String>,
    pub tone: Tone,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Embed {
    pub fn new(title: impl Into<String>, tone: Tone) -> Self {
        Self {
            title: title.into(),
            description: None,
            tone,
            fields: Vec::new(),
            footer: None,
            timestamp: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline: false,
        });
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }

    pub fn push_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline: false,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Success,
}

/// A persistent button on the storefront message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub custom_id: &'static str,
    pub label: &'static str,
    pub style: ButtonStyle,
    pub action: ActionKind,
}

/// The interactive component set attached to the storefront message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopView {
    pub buttons: Vec<Button>,
}

impl ShopView {
    pub fn new() -> Self {
        Self {
            buttons: vec![
                Button {
                    custom_id: "button_register",
                    label: "📝 Set GrowID",
                    style: ButtonStyle::Primary,
                    action: ActionKind::Register,
                },
                Button {
                    custom_id: "button_balance",
                    label: "💰 Balance",
                    style: ButtonStyle::Success,
                    action: ActionKind::Balance,
                },
                Button {
                    custom_id: "button_world_info",
                    label: "🌎 World Info",
                    style: ButtonStyle::Secondary,
                    action: ActionKind::WorldInfo,
                },
                Button {
                    custom_id: "button_buy",
                    label: "🛒 Buy",
                    style: ButtonStyle::Success,
                    action: ActionKind::Buy,
                },
                Button {
                    custom_id: "button_history",
                    label: "📜 History",
                    style: ButtonStyle::Secondary,
                    action: ActionKind::History,
                },
            ],
        }
    }

    /// Resolves a button's custom id back to the action it triggers.
    pub fn action_for(&self, custom_id: &str) -> Option<ActionKind> {
        self.buttons
            .iter()
            .find(|b| b.custom_id == custom_id)
            .map(|b| b.action)
    }
}

impl Default for ShopView {
    fn default() -> Self {
        Self::new()
    }
}

/// What to do with a message's interactive components on edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewUpdate {
    Keep,
    Attach(ShopView),
    Detach,
}

/// Partial update applied to an existing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEdit {
    pub embed: Option<Embed>,
    pub view: ViewUpdate,
}

impl MessageEdit {
    pub fn view(view: ShopView) -> Self {
        Self {
            embed: None,
            view: ViewUpdate::Attach(view),
        }
    }

    pub fn content_and_view(embed: Embed, view: ShopView) -> Self {
        Self {
            embed: Some(embed),
            view: ViewUpdate::Attach(view),
        }
    }

    /// Replaces the content and strips every interactive element.
    pub fn placeholder(embed: Embed) -> Self {
        Self {
            embed: Some(embed),
            view: ViewUpdate::Detach,
        }
    }
}

/// Form opened in response to a button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modal {
    Registration { existing: Option<GrowId> },
    Purchase { products: Vec<Product> },
}

impl Modal {
    pub fn title(&self) -> &'static str {
        match self {
            Modal::Registration { existing: Some(_) } => "📝 Update GrowID",
            Modal::Registration { existing: None } => "📝 GrowID Registration",
            Modal::Purchase { .. } => "🛍️ Purchase Product",
        }
    }
}

/// The single terminal response to an interaction. Always ephemeral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Embed(Embed),
    Modal(Modal),
}

impl Reply {
    pub fn title(&self) -> &str {
        match self {
            Reply::Embed(embed) => &embed.title,
            Reply::Modal(modal) => modal.title(),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Reply::Embed(embed) => embed.description.as_deref().unwrap_or_default(),
            Reply::Modal(_) => "",
        }
    }

    pub fn embed(&self) -> Option<&Embed> {
        match self {
            Reply::Embed(embed) => Some(embed),
            Reply::Modal(_) => None,
        }
    }
}
