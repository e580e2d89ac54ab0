//! 답변 생성 모듈
//!
//! 검색된 청크로 인용 컨텍스트를 만들고 언어 모델을 한 번 호출합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let generator = AnswerGenerator::new(Arc::new(OpenAiChat::from_config(&config)?));
//! let answer = generator.answer("What is evidential deep learning?", &retrieval.chunks).await;
//! ```

pub mod openai;
pub mod prompt;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::knowledge::ScoredChunk;

pub use openai::OpenAiChat;
pub use prompt::{build_context, build_prompt, format_chunk, NO_ANSWER_SENTENCE};

/// 모델 호출 실패 시 사용자에게 보여줄 문장
pub const GENERATION_FAILED_MESSAGE: &str = "Sorry, the answer could not be generated because the \
language model request failed. Check that GROQ_API_KEY is valid and the API is reachable, then ask again.";

// ============================================================================
// LanguageModel Trait
// ============================================================================

/// 텍스트 완성 모델
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 프롬프트 하나에 대한 응답
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;

    fn name(&self) -> &str;
}

// ============================================================================
// AnswerGenerator
// ============================================================================

pub struct AnswerGenerator {
    llm: Arc<dyn LanguageModel>,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub fn llm(&self) -> Arc<dyn LanguageModel> {
        self.llm.clone()
    }

    /// 답변 생성 (실패 시 `Generation` 에러)
    pub async fn try_answer(&self, question: &str, chunks: &[ScoredChunk]) -> Result<String> {
        let context = build_context(chunks.iter().map(|r| &r.chunk));
        let prompt = build_prompt(question, &context);

        self.llm
            .complete(&prompt)
            .await
            .map_err(|e| RagError::Generation(format!("{:#}", e)))
    }

    /// 답변 생성
    ///
    /// 모델 실패는 에러로 올리지 않고 [`GENERATION_FAILED_MESSAGE`]를 반환합니다.
    pub async fn answer(&self, question: &str, chunks: &[ScoredChunk]) -> String {
        match self.try_answer(question, chunks).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("{}", e);
                GENERATION_FAILED_MESSAGE.to_string()
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{Chunk, DocumentMetadata, SearchMethod};
    use std::sync::Mutex;

    /// 받은 프롬프트를 기록하는 모델
    struct RecordingModel {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply
                .clone()
                .ok_or_else(|| anyhow::anyhow!("503 Service Unavailable"))
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn retrieved(text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk::new(text, DocumentMetadata::default()),
            score: 0.9,
            method: SearchMethod::Vector,
        }
    }

    #[tokio::test]
    async fn test_answer_passes_context_in_order() {
        let model = Arc::new(RecordingModel {
            reply: Some("EDL places a Dirichlet prior [Sensoy, 2018].".to_string()),
            prompts: Mutex::new(vec![]),
        });
        let generator = AnswerGenerator::new(model.clone());

        let answer = generator
            .answer("What is EDL?", &[retrieved("alpha"), retrieved("beta")])
            .await;
        assert!(answer.contains("Dirichlet"));

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        let alpha = prompts[0].find("Content: alpha").unwrap();
        let beta = prompts[0].find("Content: beta").unwrap();
        assert!(alpha < beta);
        assert!(prompts[0].contains("Question: What is EDL?"));
    }

    #[tokio::test]
    async fn test_failure_returns_sentinel() {
        let generator = AnswerGenerator::new(Arc::new(RecordingModel {
            reply: None,
            prompts: Mutex::new(vec![]),
        }));

        let answer = generator.answer("q", &[retrieved("x")]).await;
        assert_eq!(answer, GENERATION_FAILED_MESSAGE);

        let err = generator.try_answer("q", &[retrieved("x")]).await.unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
    }
}
