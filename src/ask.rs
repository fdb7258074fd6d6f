//! One-shot question answering (`folio ask`).

use anyhow::Result;
use std::io::Write;
use tokio::sync::mpsc;

use folio_rag_core::intent::Intent;
use folio_rag_core::pipeline::{ChatPipeline, ChatReply, ChatRequest};

use crate::bootstrap::init_pipeline;
use crate::config::Config;

/// Flags accepted by `folio ask`.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub intent: Option<Intent>,
    pub session: Option<String>,
    pub section: Option<String>,
    pub stream: bool,
    pub no_cache: bool,
}

impl AskOptions {
    pub fn request(&self, question: &str) -> ChatRequest {
        ChatRequest {
            message: question.to_string(),
            session_id: self.session.clone(),
            current_section: self.section.clone(),
            intent: self.intent,
            skip_cache: self.no_cache,
            ..ChatRequest::default()
        }
    }
}

pub async fn run_ask(config: &Config, question: &str, opts: &AskOptions) -> Result<()> {
    if question.trim().is_empty() {
        anyhow::bail!("question must not be empty");
    }
    let pipeline = init_pipeline(config).await?;
    let request = opts.request(question);

    if opts.stream {
        let reply = ask_streaming(&pipeline, &request).await;
        print_reply_footer(&reply);
    } else {
        let reply = pipeline.chat(&request).await;
        println!("{}", reply.answer.text);
        print_reply_footer(&reply);
    }
    Ok(())
}

/// Answer `request`, printing deltas to stdout as they arrive.
pub async fn ask_streaming(pipeline: &ChatPipeline, request: &ChatRequest) -> ChatReply {
    let (tx, mut rx) = mpsc::channel::<String>(64);
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(delta) = rx.recv().await {
            print!("{}", delta);
            let _ = stdout.flush();
        }
        println!();
    });

    let reply = pipeline.chat_stream(request, &tx).await;
    drop(tx);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "stream printer stopped");
    }
    reply
}

/// Sources, suggestions and bookkeeping for a reply.
pub fn print_reply_footer(reply: &ChatReply) {
    let answer = &reply.answer;
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &answer.sources {
            println!("  - {}", source);
        }
    }
    if !answer.suggestions.is_empty() {
        println!();
        println!("You might also ask:");
        for suggestion in &answer.suggestions {
            println!("  - {}", suggestion.label);
        }
    }
    println!();
    println!(
        "[intent: {} | session: {} | docs: {} | input tokens: {}{}]",
        reply.intent,
        reply.session_id,
        answer.context_docs,
        answer.input_tokens,
        if reply.cached { " | cached" } else { "" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_map_onto_request() {
        let opts = AskOptions {
            intent: Some(Intent::Tour),
            session: Some("abc".into()),
            section: Some("projects".into()),
            stream: false,
            no_cache: true,
        };
        let request = opts.request("give me a tour");
        assert_eq!(request.message, "give me a tour");
        assert_eq!(request.session_id.as_deref(), Some("abc"));
        assert_eq!(request.current_section.as_deref(), Some("projects"));
        assert_eq!(request.intent, Some(Intent::Tour));
        assert!(request.skip_cache);
        assert_eq!(request.previous_topic, None);
    }
}
