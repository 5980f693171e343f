//! Per-event processing pipeline
//!
//! One pass per webhook event: redelivery drop, addressing, memory
//! load, prompt assembly, AI call, training-tag interpretation, reward
//! decision, reply, and (for addressed events) history save. Every
//! exit replies at most once; failures are isolated to the event.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;

use crate::ai::{ChatMessage, Role, TextRequest, VisionRequest};
use crate::api::ApiState;
use crate::line::{MessageContent, MessageEvent, OutgoingMessage, WebhookEvent};
use crate::memory::{Turn, TurnSource, summarize, turns_to_messages};
use crate::reward::{self, RewardPlan};
use crate::{Result, mention, metrics};

/// Apology when the AI backend is rate limited (terminal for the event)
const RATE_LIMIT_APOLOGY: &str = "ごめん、いまAIの上限に達しちゃってる…ちょっと後でまた話しかけて？🙏";

/// Fallback reply when the AI backend fails for any other reason
const GENERIC_FALLBACK: &str = "今は忙しいので、また後で話しかけてね！";

/// Apology when image bytes could not be fetched
const IMAGE_REFETCH_APOLOGY: &str = "画像がうまく受け取れなかったみたい…もう一度送ってくれる？";

/// Stored user utterance for image turns
const IMAGE_UTTERANCE: &str = "[画像]";

/// Process one webhook event to completion.
///
/// # Errors
///
/// Returns error only for terminal failures of this event (e.g. an
/// expired reply token); the caller logs it without affecting sibling
/// events.
pub async fn process_event(state: &ApiState, event: WebhookEvent) -> Result<()> {
    let WebhookEvent::Message(message) = event else {
        return Ok(());
    };

    if message.is_redelivery() {
        tracing::debug!("dropping redelivered event");
        return Ok(());
    }

    match &message.message {
        MessageContent::Text { text, mention, .. } => {
            handle_text(state, &message, text, mention.as_ref()).await
        }
        MessageContent::Image { id } => handle_image(state, &message, id).await,
        MessageContent::Other => Ok(()),
    }
}

/// Text branch of the pipeline
async fn handle_text(
    state: &ApiState,
    event: &MessageEvent,
    text: &str,
    text_mention: Option<&crate::line::Mention>,
) -> Result<()> {
    // With the mention-only gate off, everything counts as addressed;
    // the resolver still runs first so grace entries get recorded.
    let addressed = mention::is_addressed_text(
        event,
        text,
        text_mention,
        state.platform.as_ref(),
        &state.config.mention_keywords,
        &state.grace,
    )
    .await
        || !state.config.mention_only;

    if !addressed {
        tracing::debug!("dropping unaddressed group text (mention-only mode)");
        return Ok(());
    }

    let conv_key = event.source.conversation_key();
    let history = load_history(state, &conv_key);
    let name_hint = state
        .names
        .resolve(&event.source, state.platform.as_ref(), state.ai.as_ref())
        .await;

    let extracted = metrics::parse_metrics(text);
    let wants = reward::wants_reward(text);
    let plan = reward::plan_text(
        wants,
        state.config.reward_on_request_rate,
        state.config.reward_random_rate,
        &mut rand::thread_rng(),
    );

    let request = TextRequest {
        user_text: text.to_string(),
        name_hint,
        metric_hint: extracted.hint_line(),
        tone: plan.tone,
        history: history_messages(state.config.history_compact_chars, &history),
    };

    let raw = match state.ai.chat_text(request).await {
        Ok(raw) => raw,
        Err(e) if e.is_rate_limit() => {
            tracing::warn!("ai backend rate limited");
            return reply_text(state, event, RATE_LIMIT_APOLOGY).await;
        }
        Err(e) => {
            tracing::error!(error = %e, "ai text generation failed");
            GENERIC_FALLBACK.to_string()
        }
    };

    let tag = reward::extract_training_tag(&raw);
    let is_training = tag.training == Some(true) || extracted.any();

    send_and_save(
        state,
        event,
        &conv_key,
        &tag.clean,
        is_training,
        plan,
        text,
        TurnSource::Text,
    )
    .await
}

/// Image branch of the pipeline
async fn handle_image(state: &ApiState, event: &MessageEvent, message_id: &str) -> Result<()> {
    let addressed =
        mention::is_addressed_image(event, &state.grace) || !state.config.mention_only;

    if !addressed {
        tracing::debug!("dropping unaddressed group image (mention-only mode)");
        return Ok(());
    }

    let bytes = match state.platform.message_content(message_id).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "image content fetch failed");
            return reply_text(state, event, IMAGE_REFETCH_APOLOGY).await;
        }
    };
    let mime = sniff_image_mime(&bytes);
    let data_url = format!("data:{mime};base64,{}", BASE64.encode(&bytes));

    let conv_key = event.source.conversation_key();
    let history = load_history(state, &conv_key);
    let name_hint = state
        .names
        .resolve(&event.source, state.platform.as_ref(), state.ai.as_ref())
        .await;

    let plan = reward::plan_image(state.config.reward_random_rate, &mut rand::thread_rng());

    let request = VisionRequest {
        data_url,
        name_hint,
        tone: plan.tone,
        history: history_messages(state.config.history_compact_chars, &history),
    };

    let raw = match state.ai.chat_vision(request).await {
        Ok(raw) => raw,
        Err(e) if e.is_rate_limit() => {
            tracing::warn!("ai backend rate limited");
            return reply_text(state, event, RATE_LIMIT_APOLOGY).await;
        }
        Err(e) => {
            tracing::error!(error = %e, "ai vision generation failed");
            GENERIC_FALLBACK.to_string()
        }
    };

    // Images have no text metrics; the tag alone classifies
    let tag = reward::extract_training_tag(&raw);
    let is_training = tag.training == Some(true);

    send_and_save(
        state,
        event,
        &conv_key,
        &tag.clean,
        is_training,
        plan,
        IMAGE_UTTERANCE,
        TurnSource::Image,
    )
    .await
}

/// Apply the reward decision, send the reply, and persist the turn.
/// Only addressed events reach this point, so the turn is always
/// saved (best effort).
#[allow(clippy::too_many_arguments)]
async fn send_and_save(
    state: &ApiState,
    event: &MessageEvent,
    conv_key: &str,
    reply_body: &str,
    is_training: bool,
    plan: RewardPlan,
    user_utterance: &str,
    source: TurnSource,
) -> Result<()> {
    let mut messages = vec![OutgoingMessage::text(reply_body)];

    if reward::should_attach(is_training, plan) {
        // Pool consulted at send time; emptiness downgrades silently
        if let Some(asset) = state.rewards.pick() {
            messages.push(OutgoingMessage::Image {
                original_content_url: asset.original,
                preview_image_url: asset.preview,
            });
        }
    }

    let Some(reply_token) = event.reply_token.as_deref() else {
        tracing::warn!("event carried no reply token");
        return Ok(());
    };
    state.platform.reply(reply_token, &messages).await?;

    let turn = Turn {
        user_text: user_utterance.to_string(),
        bot_text: reply_body.to_string(),
        ts_ms: Utc::now().timestamp_millis(),
        source,
    };
    if let Err(e) = state.conversations.save(conv_key, &turn) {
        // Store outages degrade to statelessness, never to failure
        tracing::warn!(error = %e, "conversation save failed");
    }

    Ok(())
}

/// Render history for the prompt: full alternating turns, or a single
/// compact summary turn when a character budget is configured
fn history_messages(compact_chars: Option<usize>, history: &[Turn]) -> Vec<ChatMessage> {
    match compact_chars {
        Some(budget) if !history.is_empty() => {
            let summary = summarize(history, budget);
            vec![ChatMessage::new(
                Role::System,
                format!("これまでの会話の要約:\n{summary}"),
            )]
        }
        _ => turns_to_messages(history),
    }
}

/// Load history, degrading to empty on store failure
fn load_history(state: &ApiState, conv_key: &str) -> Vec<Turn> {
    state.conversations.load(conv_key).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "conversation load failed, continuing stateless");
        Vec::new()
    })
}

/// Reply with a single text part
async fn reply_text(state: &ApiState, event: &MessageEvent, text: &str) -> Result<()> {
    let Some(reply_token) = event.reply_token.as_deref() else {
        return Ok(());
    };
    state
        .platform
        .reply(reply_token, &[OutgoingMessage::text(text)])
        .await
}

/// Sniff an image MIME type from magic bytes, defaulting to JPEG
fn sniff_image_mime(buf: &[u8]) -> &'static str {
    if buf.starts_with(&[0xff, 0xd8, 0xff]) {
        "image/jpeg"
    } else if buf.starts_with(&[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a]) {
        "image/png"
    } else if buf.starts_with(b"RIFF") && buf.get(8..12) == Some(b"WEBP".as_slice()) {
        "image/webp"
    } else if buf.starts_with(b"GIF87a") || buf.starts_with(b"GIF89a") {
        "image/gif"
    } else {
        "image/jpeg"
    }
}
