use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Completion, LlmClient, LlmError, TokenReceiver};

/// Scripted in-memory [`LlmClient`] for tests.
pub struct MockLlmClient {
    answer: Mutex<String>,
    prompt_tokens: i64,
    completion_tokens: i64,
    complete_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    fail: AtomicBool,
    token_delay: Mutex<Duration>,
    last_system: Mutex<String>,
    last_user: Mutex<String>,
}

impl MockLlmClient {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: Mutex::new(answer.to_string()),
            prompt_tokens: 120,
            completion_tokens: 40,
            complete_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            token_delay: Mutex::new(Duration::ZERO),
            last_system: Mutex::new(String::new()),
            last_user: Mutex::new(String::new()),
        }
    }

    pub fn set_answer(&self, answer: &str) {
        *self.answer.lock() = answer.to_string();
    }

    /// Delays each streamed token, so tests can interleave cancellation.
    pub fn set_token_delay(&self, delay: Duration) {
        *self.token_delay.lock() = delay;
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// System prompt observed on the most recent call.
    pub fn last_system(&self) -> String {
        self.last_system.lock().clone()
    }

    /// User prompt observed on the most recent call.
    pub fn last_user(&self) -> String {
        self.last_user.lock().clone()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new("Mock answer.")
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_system.lock() = system.to_string();
        *self.last_user.lock() = user.to_string();

        if self.fail.load(Ordering::SeqCst) {
            return Err(LlmError::Transport("mock llm failure".to_string()));
        }

        Ok(Completion {
            text: self.answer.lock().clone(),
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
        })
    }

    async fn stream(&self, system: &str, user: &str) -> Result<TokenReceiver, LlmError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_system.lock() = system.to_string();
        *self.last_user.lock() = user.to_string();

        if self.fail.load(Ordering::SeqCst) {
            return Err(LlmError::Transport("mock llm failure".to_string()));
        }

        let answer = self.answer.lock().clone();
        let delay = *self.token_delay.lock();
        let (tx, rx) = mpsc::channel(8);

        tokio::spawn(async move {
            let words: Vec<&str> = answer.split_whitespace().collect();
            let count = words.len();
            for (i, word) in words.into_iter().enumerate() {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let token = if i + 1 < count {
                    format!("{word} ")
                } else {
                    word.to_string()
                };
                if tx.send(Ok(token)).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}
