//! Interactive chat over stdin (`folio chat`).
//!
//! All turns share one pipeline, so the response cache, usage ledger and
//! session history persist for the lifetime of the process.
//!
//! | Input | Effect |
//! |-------|--------|
//! | `/stats` | Print cache and usage counters |
//! | `/clear` | Empty the response cache |
//! | `/quit` | Exit (also on EOF) |

use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use folio_rag_core::pipeline::{ChatPipeline, ChatRequest};

use crate::ask::{ask_streaming, print_reply_footer};
use crate::bootstrap::init_pipeline;
use crate::config::Config;
use crate::stats::print_pipeline_stats;

/// One line of user input, interpreted.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Stats,
    Clear,
    Quit,
    UnknownCommand(&'a str),
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "/stats" => Input::Stats,
        "/clear" => Input::Clear,
        "/quit" | "/exit" => Input::Quit,
        cmd if cmd.starts_with('/') => Input::UnknownCommand(cmd),
        message => Input::Message(message),
    }
}

pub async fn run_chat(config: &Config, session: Option<String>, stream: bool) -> Result<()> {
    let pipeline = init_pipeline(config).await?;
    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if !pipeline.retriever().is_initialized() {
        println!("(vector index unavailable: answers will not use retrieved context)");
    }
    println!("Session {}. Type /stats, /clear or /quit.", session_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Stats => print_pipeline_stats(&pipeline.stats(Some(&session_id))),
            Input::Clear => {
                pipeline.cache().clear();
                println!("Cache cleared.");
            }
            Input::UnknownCommand(cmd) => {
                println!("Unknown command: {}. Try /stats, /clear or /quit.", cmd)
            }
            Input::Message(message) => {
                turn(&pipeline, &session_id, message, stream).await;
            }
        }
    }

    Ok(())
}

async fn turn(pipeline: &ChatPipeline, session_id: &str, message: &str, stream: bool) {
    let request = ChatRequest::new(message).in_session(session_id);
    let reply = if stream {
        ask_streaming(pipeline, &request).await
    } else {
        let reply = pipeline.chat(&request).await;
        println!("{}", reply.answer.text);
        reply
    };
    print_reply_footer(&reply);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("   "), Input::Empty);
        assert_eq!(parse_input("/stats"), Input::Stats);
        assert_eq!(parse_input(" /clear "), Input::Clear);
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/help"), Input::UnknownCommand("/help"));
        assert_eq!(
            parse_input("what did you build?\n"),
            Input::Message("what did you build?")
        );
    }
}
