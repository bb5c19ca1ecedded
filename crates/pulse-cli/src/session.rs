use anyhow::Result;
use bat::PrettyPrinter;
use cliclack::{input, spinner};
use console::style;

use pulse::agent::{Agent, AgentEvent, TurnOutcome};
use pulse::models::message::Message;

/// Tool results past this length are cut for display; the model always sees
/// the full text.
const TOOL_RESULT_DISPLAY_LIMIT: usize = 500;

/// An interactive conversation with one agent.
pub struct Session {
    agent: Agent,
    messages: Vec<Message>,
}

enum ConsoleInput {
    Message(String),
    Clear,
    Exit,
    AskAgain,
}

impl Session {
    pub fn new(agent: Agent) -> Self {
        Session {
            agent,
            messages: Vec::new(),
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        loop {
            match self.get_input()? {
                ConsoleInput::Message(text) => self.run_turn(&text).await,
                ConsoleInput::Clear => {
                    self.messages.clear();
                    println!("{}", style("Conversation cleared.").green());
                }
                ConsoleInput::AskAgain => continue,
                ConsoleInput::Exit => break,
            }
        }
        println!("{}", style("Goodbye!").dim());
        Ok(())
    }

    fn get_input(&self) -> Result<ConsoleInput> {
        let line: String = input("You:")
            .placeholder("ask about your metrics")
            .interact()?;
        let line = line.trim();

        // Empty input never reaches the agent loop.
        if line.is_empty() {
            return Ok(ConsoleInput::AskAgain);
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            return Ok(ConsoleInput::Exit);
        }
        if line.eq_ignore_ascii_case("clear") {
            return Ok(ConsoleInput::Clear);
        }
        Ok(ConsoleInput::Message(line.to_string()))
    }

    async fn run_turn(&mut self, text: &str) {
        let history = std::mem::take(&mut self.messages);
        let mut reply = self.agent.reply(history, text);

        let mut busy: Option<cliclack::ProgressBar> = None;
        while let Some(event) = reply.next_event().await {
            if let Some(bar) = busy.take() {
                bar.stop("");
            }
            match event {
                AgentEvent::Thinking { message } => {
                    let bar = spinner();
                    bar.start(&message);
                    busy = Some(bar);
                }
                AgentEvent::ToolCall { name, arguments } => {
                    println!("{} {}", style("tool:").cyan().bold(), style(&name).cyan());
                    let pretty = serde_json::to_string_pretty(&arguments)
                        .unwrap_or_else(|_| arguments.to_string());
                    println!("{}", style(pretty).dim());
                }
                AgentEvent::ToolResult { output, .. } => {
                    println!(
                        "{} {}",
                        style("result:").magenta().bold(),
                        style(truncate_for_display(&output, TOOL_RESULT_DISPLAY_LIMIT)).dim()
                    );
                }
                AgentEvent::Response { text } => {
                    println!();
                    render_markdown(&text);
                }
                AgentEvent::Error { message } => {
                    println!("{} {}", style("error:").red().bold(), style(message).red());
                }
            }
        }
        if let Some(bar) = busy.take() {
            bar.stop("");
        }

        if reply.outcome() == Some(TurnOutcome::IterationLimit) {
            println!(
                "{}",
                style("Stopped: the iteration limit was reached before a final answer.").yellow()
            );
        }

        self.messages = reply.into_history();
        println!();
    }
}

fn render_markdown(content: &str) {
    let printed = PrettyPrinter::new()
        .input_from_bytes(content.as_bytes())
        .language("markdown")
        .print();
    if printed.is_err() {
        println!("{content}");
    }
}

fn truncate_for_display(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((index, _)) => format!("{}...", &text[..index]),
    }
}
