// src/analyze/reply.rs
use crate::analyze::ai_adapter::MeteredReasoner;
use crate::analyze::types::AnalyzedItem;
use crate::stats::UsageCategory;

pub const REPLY_UNAVAILABLE: &str = "Unable to generate response.";

fn reply_system_prompt(context: &str) -> String {
    format!(
        "You are a knowledgeable Redditor replying to a post.\n\n{context}\n\nRules:\n\
         - Keep the reply SHORT (3-5 sentences max)\n\
         - Directly address the person's specific pain point\n\
         - Provide one concrete, actionable insight\n\
         - Mention the company/service and niche in a genuinely natural fit that looks like a real recommendation, not an ad\n\
         - Sound like a real person, not a marketer"
    )
}

pub fn reply_user_message(lead: &AnalyzedItem) -> String {
    let body: String = lead.item.body.chars().take(1200).collect();
    format!(
        "Write a concise Reddit reply to this post:\n\nTitle: {}\nContent: {}\nKey pain points: {}",
        lead.item.title,
        body,
        lead.analysis.pain_points.join(", ")
    )
}

/// Draft a reply for one lead; never fails.
pub async fn draft_reply(reasoner: &MeteredReasoner, lead: &AnalyzedItem, context: &str) -> String {
    reasoner
        .ask(
            UsageCategory::ReplyGeneration,
            &reply_system_prompt(context),
            &reply_user_message(lead),
            0.7,
            300,
        )
        .await
        .unwrap_or_else(|| REPLY_UNAVAILABLE.to_string())
}
