//! Static table of the models the service exposes.
//!
//! Ids are parsed into [`ModelId`] at the boundary; nothing downstream handles
//! raw model strings.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelId {
    #[default]
    #[serde(rename = "gpt2_native")]
    Gpt2Native,
    #[serde(rename = "gpt2_onnx")]
    Gpt2Onnx,
    #[serde(rename = "Llama2.7")]
    Llama,
    #[serde(rename = "BonQuiQui")]
    BonQuiQui,
    #[serde(rename = "MsSwan")]
    MsSwan,
    #[serde(rename = "Bonifa")]
    Bonifa,
}

/// Whether the server keeps conversational context between requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statefulness {
    /// No server session; only the newest user turn is sent.
    Stateless,
    /// Full history is resent every turn.
    Stateful,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    SingleShot,
    Streaming,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub id: ModelId,
    pub display_label: &'static str,
    pub statefulness: Statefulness,
    pub endpoint_path: &'static str,
    pub persona_preamble: Option<&'static str>,
    pub routing: Routing,
    /// Value of the `model` field on the wire.
    pub wire_model: &'static str,
    /// Label shown in front of assistant replies, if any.
    pub speaker: Option<&'static str>,
}

const BON_QUI_QUI: &str = "You are Bon Qui Qui, a comically rude, gangsta cashier. Always say 'I WILL CUUUUT you!' and 'Seccurrrity! You need to go!'. Respond with humor, sarcasm, and attitude.";
const MS_SWAN: &str = "You are Ms. Swan, a quirky, heavily-accented woman known for her catchphrase 'He look-a like a man.' Respond evasively and exasperatingly.";
const BONIFA: &str = "You are Bonifa Latifa Halifa Sherifa Jackson, loud, brash, and constantly yakking on her cell. Demand respect with humor and sass.";

static MODELS: [ModelDescriptor; 6] = [
    ModelDescriptor {
        id: ModelId::Gpt2Native,
        display_label: "GPT-2 (native PyTorch)",
        statefulness: Statefulness::Stateless,
        endpoint_path: "/chat/native-gpt2",
        persona_preamble: None,
        routing: Routing::SingleShot,
        wire_model: "gpt2",
        speaker: None,
    },
    ModelDescriptor {
        id: ModelId::Gpt2Onnx,
        display_label: "GPT-2 (Open Neural Network Exchange)",
        statefulness: Statefulness::Stateless,
        endpoint_path: "/chat/onnx-gpt2",
        persona_preamble: None,
        routing: Routing::SingleShot,
        wire_model: "gpt2",
        speaker: None,
    },
    ModelDescriptor {
        id: ModelId::Llama,
        display_label: "Llama2.7",
        statefulness: Statefulness::Stateful,
        endpoint_path: "/chat/stream",
        persona_preamble: None,
        routing: Routing::Streaming,
        wire_model: "Llama2.7",
        speaker: Some("Assistant"),
    },
    ModelDescriptor {
        id: ModelId::BonQuiQui,
        display_label: "Llama2.7 Bon Qui Qui",
        statefulness: Statefulness::Stateful,
        endpoint_path: "/chat/stream",
        persona_preamble: Some(BON_QUI_QUI),
        routing: Routing::Streaming,
        wire_model: "BonQuiQui",
        speaker: Some("Bon Qui Qui"),
    },
    ModelDescriptor {
        id: ModelId::MsSwan,
        display_label: "Llama2.7 Ms Swan",
        statefulness: Statefulness::Stateful,
        endpoint_path: "/chat/stream",
        persona_preamble: Some(MS_SWAN),
        routing: Routing::Streaming,
        wire_model: "MsSwan",
        speaker: Some("Ms Swan"),
    },
    ModelDescriptor {
        id: ModelId::Bonifa,
        display_label: "Llama2.7 Bonifa",
        statefulness: Statefulness::Stateful,
        endpoint_path: "/chat/stream",
        persona_preamble: Some(BONIFA),
        routing: Routing::Streaming,
        wire_model: "Bonifa",
        speaker: Some("Bonifa"),
    },
];

impl ModelId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gpt2Native => "gpt2_native",
            Self::Gpt2Onnx => "gpt2_onnx",
            Self::Llama => "Llama2.7",
            Self::BonQuiQui => "BonQuiQui",
            Self::MsSwan => "MsSwan",
            Self::Bonifa => "Bonifa",
        }
    }

    pub fn descriptor(self) -> &'static ModelDescriptor {
        // The table is declared in enum order.
        &MODELS[self as usize]
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MODELS
            .iter()
            .map(|m| m.id)
            .find(|id| id.as_str() == s)
            .ok_or_else(|| Error::UnknownModel(s.to_string()))
    }
}

/// Look up a model by its string id.
pub fn resolve(model_id: &str) -> Result<&'static ModelDescriptor> {
    model_id.parse::<ModelId>().map(ModelId::descriptor)
}

/// Every model, in display order.
pub fn all() -> &'static [ModelDescriptor] {
    &MODELS
}
