//! Turns one inbound user message into a persisted user/assistant exchange.

use log::{debug, warn};
use std::sync::Arc;

use super::error::{ChatError, ChatResult};
use super::locks::SessionLocks;
use crate::completion::{ChatCompleter, CompletionOptions, PromptMessage};
use crate::store::{ChatMessage, ConversationStore, NewChatMessage};

/// Both records written by one successful [`MessageProcessor::process_user_message`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedExchange {
    pub user_message: ChatMessage,
    pub assistant_message: ChatMessage,
}

/// Orchestrates store writes around a completion call.
pub struct MessageProcessor {
    store: Arc<dyn ConversationStore>,
    completer: Arc<dyn ChatCompleter>,
    options: CompletionOptions,
    locks: SessionLocks,
}

impl MessageProcessor {
    pub fn new(store: Arc<dyn ConversationStore>, completer: Arc<dyn ChatCompleter>) -> Self {
        Self {
            store,
            completer,
            options: CompletionOptions::default(),
            locks: SessionLocks::new(),
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    /// Persist the user turn, generate a reply from the full history and
    /// persist it.
    ///
    /// Calls for the same session are serialized. If generation fails the
    /// user turn stays stored.
    pub async fn process_user_message(
        &self,
        session_id: i64,
        content: &str,
    ) -> ChatResult<ProcessedExchange> {
        let _turn = self.locks.acquire(session_id).await;

        let session = self
            .store
            .get_chat_session(session_id)
            .await?
            .ok_or(ChatError::SessionNotFound(session_id))?;

        let user_message = self
            .store
            .create_chat_message(NewChatMessage::user(session_id, content))
            .await?;

        let history = self.store.get_chat_messages(session_id).await?;
        let prompt: Vec<PromptMessage> = history.iter().map(PromptMessage::from).collect();
        debug!(
            "Session {}: generating reply from {} messages",
            session_id,
            prompt.len()
        );

        let reply = self
            .completer
            .generate_completion(session.provider_id, &session.model, &prompt, self.options)
            .await
            .inspect_err(|e| {
                warn!(
                    "Session {}: user message {} saved, no reply: {}",
                    session_id, user_message.id, e
                )
            })?;

        let assistant_message = self
            .store
            .create_chat_message(NewChatMessage::assistant(session_id, reply))
            .await?;

        Ok(ProcessedExchange {
            user_message,
            assistant_message,
        })
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionError, CompletionResult, VendorError};
    use crate::store::{ChatRole, MemoryStore, NewChatSession};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replies with a fixed text, or fails, and records every prompt.
    #[derive(Default)]
    struct ScriptedCompleter {
        fail: bool,
        delay: Option<Duration>,
        prompts: Mutex<Vec<Vec<PromptMessage>>>,
        options: Mutex<Vec<CompletionOptions>>,
    }

    #[async_trait]
    impl ChatCompleter for ScriptedCompleter {
        async fn generate_completion(
            &self,
            _provider_id: i64,
            _model: &str,
            messages: &[PromptMessage],
            options: CompletionOptions,
        ) -> CompletionResult<String> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            self.options.lock().unwrap().push(options);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(CompletionError::failed(
                    "fake",
                    VendorError::Decode("boom".into()),
                ));
            }
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
            Ok(format!("echo: {}", last))
        }
    }

    async fn setup(completer: ScriptedCompleter) -> (MessageProcessor, Arc<MemoryStore>, Arc<ScriptedCompleter>, i64) {
        let store = Arc::new(MemoryStore::new());
        let session = store
            .create_chat_session(NewChatSession {
                user_id: 1,
                title: "t".into(),
                provider_id: 1,
                model: "m".into(),
            })
            .await
            .unwrap();
        let completer = Arc::new(completer);
        let processor = MessageProcessor::new(store.clone(), completer.clone());
        (processor, store, completer, session.id)
    }

    #[tokio::test]
    async fn test_exchange_persisted_in_order() {
        let (processor, store, completer, sid) = setup(ScriptedCompleter::default()).await;

        let exchange = processor.process_user_message(sid, "Hello").await.unwrap();
        assert_eq!(exchange.user_message.role, ChatRole::User);
        assert_eq!(exchange.user_message.content, "Hello");
        assert_eq!(exchange.assistant_message.role, ChatRole::Assistant);
        assert_eq!(exchange.assistant_message.content, "echo: Hello");
        assert!(exchange.user_message.id < exchange.assistant_message.id);

        let stored = store.get_chat_messages(sid).await.unwrap();
        assert_eq!(stored, vec![exchange.user_message, exchange.assistant_message]);

        // The prompt already contained the new user turn.
        let prompts = completer.prompts.lock().unwrap();
        assert_eq!(prompts[0].len(), 1);
        assert_eq!(prompts[0][0].content, "Hello");
    }

    #[tokio::test]
    async fn test_sampling_options_forwarded() {
        let (processor, _store, completer, sid) = setup(ScriptedCompleter::default()).await;
        let processor = processor.with_options(CompletionOptions {
            temperature: 0.2,
            max_tokens: Some(256),
        });

        processor.process_user_message(sid, "Hello").await.unwrap();

        let options = completer.options.lock().unwrap();
        assert_eq!(options[0].temperature, 0.2);
        assert_eq!(options[0].max_tokens, Some(256));
    }

    #[tokio::test]
    async fn test_history_replayed_on_second_turn() {
        let (processor, _store, completer, sid) = setup(ScriptedCompleter::default()).await;
        processor.process_user_message(sid, "one").await.unwrap();
        processor.process_user_message(sid, "two").await.unwrap();

        let prompts = completer.prompts.lock().unwrap();
        let roles: Vec<ChatRole> = prompts[1].iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![ChatRole::User, ChatRole::Assistant, ChatRole::User]
        );
    }

    #[tokio::test]
    async fn test_user_turn_survives_completion_failure() {
        let (processor, store, _completer, sid) = setup(ScriptedCompleter {
            fail: true,
            ..Default::default()
        })
        .await;

        let err = processor.process_user_message(sid, "Hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Completion(_)));

        let stored = store.get_chat_messages(sid).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].role, ChatRole::User);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (processor, store, completer, _sid) = setup(ScriptedCompleter::default()).await;
        let err = processor.process_user_message(999, "Hi").await.unwrap_err();
        assert!(matches!(err, ChatError::SessionNotFound(999)));
        assert!(completer.prompts.lock().unwrap().is_empty());
        assert!(store.get_chat_messages(999).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_session_calls_serialize() {
        let (processor, store, completer, sid) = setup(ScriptedCompleter {
            delay: Some(Duration::from_millis(30)),
            ..Default::default()
        })
        .await;

        let (a, b) = tokio::join!(
            processor.process_user_message(sid, "first"),
            processor.process_user_message(sid, "second"),
        );
        a.unwrap();
        b.unwrap();

        // Each pair is contiguous: user, assistant, user, assistant.
        let roles: Vec<ChatRole> = store
            .get_chat_messages(sid)
            .await
            .unwrap()
            .iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(
            roles,
            vec![
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::User,
                ChatRole::Assistant
            ]
        );
        // The second call saw the first call's full exchange.
        let prompts = completer.prompts.lock().unwrap();
        assert_eq!(prompts[1].len(), 3);
    }
}
