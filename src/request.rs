use crate::conversation::{Conversation, Message};
use crate::error::{Error, Result};
use crate::registry::{ModelDescriptor, Routing, Statefulness};
use serde::Serialize;
use tracing::debug;

/// JSON body shared by the single-shot and streaming endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestPayload {
    pub model: &'static str,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub payload: RequestPayload,
    pub routing: Routing,
    pub endpoint: &'static str,
}

/// Record the user's text in `conversation` and build the request for it.
///
/// Returns `Ok(None)` for blank input, leaving the conversation untouched.
/// Stateless models get only the new message. Stateful models get the whole
/// log, preceded by the persona preamble when this is the conversation's first
/// turn. The preamble is never written into the log itself, so later turns
/// cannot repeat it.
pub fn build_request(
    descriptor: &ModelDescriptor,
    conversation: &mut Conversation,
    new_user_text: &str,
) -> Result<Option<OutboundRequest>> {
    if !conversation.is_idle() {
        return Err(Error::TurnInProgress(conversation.state()));
    }

    let prior_turns = conversation.len();
    if !conversation.append_user(new_user_text) {
        return Ok(None);
    }

    let messages: Vec<Message> = match descriptor.statefulness {
        Statefulness::Stateless => conversation.last().cloned().into_iter().collect(),
        Statefulness::Stateful => {
            let persona = descriptor
                .persona_preamble
                .filter(|_| prior_turns == 0)
                .map(Message::user);
            persona
                .into_iter()
                .chain(conversation.messages().iter().cloned())
                .collect()
        }
    };

    debug!(
        model = %descriptor.id,
        messages = messages.len(),
        prior_turns,
        routing = ?descriptor.routing,
        "built chat request"
    );

    Ok(Some(OutboundRequest {
        payload: RequestPayload {
            model: descriptor.wire_model,
            messages,
        },
        routing: descriptor.routing,
        endpoint: descriptor.endpoint_path,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{self, ModelId};

    fn with_history(turns: usize) -> Conversation {
        let mut conv = Conversation::new();
        for i in 0..turns {
            conv.append_user(&format!("question {i}"));
            conv.begin_turn().unwrap();
            conv.complete_assistant_turn(format!("answer {i}")).unwrap();
        }
        conv
    }

    fn persona_count(req: &OutboundRequest, persona: &str) -> usize {
        req.payload
            .messages
            .iter()
            .filter(|m| m.content == persona)
            .count()
    }

    #[test]
    fn blank_input_builds_nothing() {
        let mut conv = with_history(1);
        let desc = ModelId::BonQuiQui.descriptor();
        assert_eq!(build_request(desc, &mut conv, "  \n ").unwrap(), None);
        assert_eq!(conv.len(), 2);
    }

    #[test]
    fn stateless_sends_only_newest_message() {
        for model in [ModelId::Gpt2Native, ModelId::Gpt2Onnx] {
            for turns in [0, 1, 5] {
                let mut conv = with_history(turns);
                let req = build_request(model.descriptor(), &mut conv, " hi ")
                    .unwrap()
                    .unwrap();
                assert_eq!(req.payload.messages, vec![Message::user("hi")]);
                assert_eq!(req.payload.model, "gpt2");
                assert_eq!(req.routing, Routing::SingleShot);
                // The log still gets the message.
                assert_eq!(conv.len(), turns * 2 + 1);
            }
        }
    }

    #[test]
    fn persona_prefixes_first_turn_only() {
        let desc = registry::resolve("MsSwan").unwrap();
        let persona = desc.persona_preamble.unwrap();
        let mut conv = Conversation::new();

        let first = build_request(desc, &mut conv, "who are you").unwrap().unwrap();
        assert_eq!(
            first.payload.messages,
            vec![Message::user(persona), Message::user("who are you")]
        );
        assert_eq!(first.routing, Routing::Streaming);
        assert_eq!(first.endpoint, "/chat/stream");
        assert_eq!(conv.len(), 1, "persona must not enter the log");

        conv.begin_turn().unwrap();
        conv.complete_assistant_turn("He look-a like a man.").unwrap();

        let second = build_request(desc, &mut conv, "pardon?").unwrap().unwrap();
        assert_eq!(persona_count(&second, persona), 0);
        assert_eq!(
            second.payload.messages,
            vec![
                Message::user("who are you"),
                Message::assistant("He look-a like a man."),
                Message::user("pardon?"),
            ]
        );
    }

    #[test]
    fn persona_not_injected_after_an_unanswered_turn() {
        let desc = ModelId::Bonifa.descriptor();
        let mut conv = Conversation::new();
        conv.append_user("hello?");

        let req = build_request(desc, &mut conv, "anyone?").unwrap().unwrap();
        assert_eq!(persona_count(&req, desc.persona_preamble.unwrap()), 0);
        assert_eq!(req.payload.messages.len(), 2);
    }

    #[test]
    fn stateful_without_persona_sends_history() {
        let mut conv = with_history(2);
        let req = build_request(ModelId::Llama.descriptor(), &mut conv, "next")
            .unwrap()
            .unwrap();
        assert_eq!(req.payload.messages.len(), 5);
        assert_eq!(req.payload.messages[0], Message::user("question 0"));
        assert_eq!(req.payload.model, "Llama2.7");
    }

    #[test]
    fn busy_conversation_is_rejected() {
        let mut conv = Conversation::new();
        conv.append_user("first");
        conv.begin_turn().unwrap();

        let err = build_request(ModelId::Llama.descriptor(), &mut conv, "second").unwrap_err();
        assert!(matches!(err, Error::TurnInProgress(_)));
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn payload_serializes_to_wire_shape() {
        let mut conv = Conversation::new();
        let req = build_request(ModelId::Gpt2Onnx.descriptor(), &mut conv, "hey")
            .unwrap()
            .unwrap();
        let json = serde_json::to_value(&req.payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt2",
                "messages": [{"role": "user", "content": "hey"}]
            })
        );
    }
}
