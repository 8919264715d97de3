//! Prompt completion callable.

use axum::{body::Bytes, extract::State, Json};
use service_core::error::AppError;
use std::sync::Arc;
use validator::Validate;

use super::upstream;
use crate::dtos::{parse_callable_body, CallableResponse, CompletionRequest, CompletionResponse};
use crate::middleware::CallerIdentity;
use crate::services::metrics::record_completion;
use crate::services::{AccountStore, ChatCompletionProvider, ChatMessage};
use crate::startup::AppState;

/// Forwards a prompt to the LLM and records the answer on the caller's account.
pub struct CompletionHandler {
    llm: Arc<dyn ChatCompletionProvider>,
    accounts: Arc<dyn AccountStore>,
    system_prompt: String,
}

impl CompletionHandler {
    pub fn new(
        llm: Arc<dyn ChatCompletionProvider>,
        accounts: Arc<dyn AccountStore>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            accounts,
            system_prompt: system_prompt.into(),
        }
    }

    pub async fn handle(
        &self,
        caller: &CallerIdentity,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, AppError> {
        request.validate()?;

        let messages = [
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(request.user_prompt),
        ];

        let raw = self.llm.complete(&messages).await.map_err(|e| {
            tracing::error!(uid = %caller.uid, error = %e, "Chat completion failed");
            upstream(e)
        })?;
        let message = raw.trim().to_string();

        tracing::info!(
            uid = %caller.uid,
            answer_len = message.len(),
            "Completion received"
        );

        self.accounts
            .append_answer(&caller.uid, &message)
            .await
            .map_err(|e| {
                tracing::error!(uid = %caller.uid, error = %e, "Failed to store answer");
                AppError::UpstreamFailure(e.context("failed to store answer"))
            })?;

        Ok(CompletionResponse { message })
    }
}

/// `POST /functions/generate-completion`
pub async fn generate_completion(
    State(state): State<AppState>,
    caller: Option<CallerIdentity>,
    body: Bytes,
) -> Json<CallableResponse<CompletionResponse>> {
    let result = invoke(&state, caller, &body).await;

    match &result {
        Ok(_) => record_completion("success"),
        Err(e) => {
            tracing::warn!(error = %e, "generate_completion returned an error payload");
            record_completion(e.kind());
        }
    }

    Json(result.into())
}

async fn invoke(
    state: &AppState,
    caller: Option<CallerIdentity>,
    body: &[u8],
) -> Result<CompletionResponse, AppError> {
    let caller = caller.ok_or(AppError::Unauthenticated)?;
    let request: CompletionRequest = parse_callable_body(body)?;
    state.completion.handle(&caller, request).await
}
