//! Interactive chat REPL
//!
//! Terminal front end over the three engines. Plain input goes to
//! whichever register is active (exercise step, reflection, or open chat);
//! slash commands drive the flow/reflection lifecycles.

use std::sync::Arc;

use colored::Colorize;
use eyre::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use mindstore::SummaryArtifact;

use crate::exercise::{ExerciseEvent, ExerciseFlowEngine, FlowPhase, StartOutcome};
use crate::reflection::{ReflectionEngine, ReflectionEvent, ReflectionKind};
use crate::session::{ChatEvent, SessionEngine};

/// Interactive REPL over the orchestration engines
pub struct Repl {
    chat: SessionEngine,
    exercise: ExerciseFlowEngine,
    reflection: ReflectionEngine,
    /// A finished flow is waiting for its closing mood rating
    awaiting_post_mood: bool,
}

enum SlashResult {
    Continue,
    Quit,
}

impl Repl {
    pub fn new(chat: SessionEngine, exercise: ExerciseFlowEngine, reflection: ReflectionEngine) -> Self {
        Self {
            chat,
            exercise,
            reflection,
            awaiting_post_mood: false,
        }
    }

    /// Run the REPL main loop
    pub async fn run(&mut self, initial_message: Option<String>) -> Result<()> {
        self.print_welcome();

        if let Some(message) = initial_message {
            println!("{} {}", ">".bright_green(), message);
            self.process_input(&message).await;
        }

        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        loop {
            let readline = rl.readline(&format!("{} ", ">".bright_green()));

            match readline {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(input);

                    if input.starts_with('/') {
                        match self.handle_slash_command(input).await {
                            SlashResult::Continue => continue,
                            SlashResult::Quit => break,
                        }
                    } else {
                        self.process_input(input).await;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        println!("Take care.");
        Ok(())
    }

    fn print_welcome(&self) {
        println!("{}", "sol - your space to talk".bold());
        println!(
            "{}",
            "commands: /exercise <name> [mood 1-5], /reflect <value|pattern|vision> <topic>, \
             /end, /save, /cancel, /bye [save], /quit"
                .dimmed()
        );
        println!();
    }

    /// Route plain input to the active register
    async fn process_input(&mut self, input: &str) {
        if self.awaiting_post_mood {
            let rating = input.parse::<u8>().ok();
            self.exercise.confirm_post_mood(rating);
            self.awaiting_post_mood = false;
            println!("{}", "Noted. Back to open conversation.".dimmed());
            return;
        }

        if matches!(self.exercise.phase(), FlowPhase::Active { .. }) {
            let event = self.exercise.submit_step_response(input).await;
            self.render_exercise_event(event);
            return;
        }

        if self.reflection.is_active() {
            let event = self.reflection.submit_response(input).await;
            self.render_reflection_event(event);
            return;
        }

        let event = self.chat.submit(input).await;
        self.render_chat_event(event);

        if let Some(category) = self.chat.detect_exercise_confirmation() {
            println!(
                "{}",
                format!("(looks like a yes - starting with /exercise {})", category).dimmed()
            );
            self.start_exercise(&category, 3).await;
        }
    }

    async fn handle_slash_command(&mut self, input: &str) -> SlashResult {
        let mut parts = input.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let rest: Vec<&str> = parts.collect();

        match command {
            "/exercise" => {
                let Some(descriptor) = rest.first() else {
                    println!("{}", "usage: /exercise <name> [mood 1-5]".dimmed());
                    return SlashResult::Continue;
                };
                let mood = rest.get(1).and_then(|m| m.parse::<u8>().ok()).unwrap_or(3);
                self.start_exercise(descriptor, mood).await;
            }
            "/reflect" => match rest.split_first() {
                Some((&"value", topic)) if !topic.is_empty() => {
                    let kind = ReflectionKind::Value {
                        value: topic.join(" "),
                    };
                    let event = self.reflection.start(kind).await;
                    self.render_reflection_event(event);
                }
                Some((&"pattern", topic)) if !topic.is_empty() => {
                    let kind = ReflectionKind::ThinkingPattern {
                        original_thought: topic.join(" "),
                        reframed_thought: None,
                    };
                    let event = self.reflection.start(kind).await;
                    self.render_reflection_event(event);
                }
                Some((&"vision", topic)) if !topic.is_empty() => {
                    let kind = ReflectionKind::Vision { area: topic.join(" ") };
                    let event = self.reflection.start(kind).await;
                    self.render_reflection_event(event);
                }
                _ => println!("{}", "usage: /reflect <value|pattern|vision> <topic>".dimmed()),
            },
            "/end" => {
                if self.reflection.is_active() {
                    let event = self.reflection.end().await;
                    self.render_reflection_event(event);
                } else {
                    println!("{}", "no reflection in progress".dimmed());
                }
            }
            "/save" => {
                if self.reflection.save() {
                    println!("{}", "Reflection saved.".dimmed());
                } else {
                    println!("{}", "nothing to save".dimmed());
                }
            }
            "/cancel" => {
                self.reflection.cancel();
                println!("{}", "Summary discarded - we can keep going.".dimmed());
            }
            "/bye" => {
                let save = rest.first().is_some_and(|r| *r == "save");
                let receipt = self.chat.end_session(save);
                println!("{}", "Session ended. See you next time.".dimmed());
                // Background work finishes on its own; REPL exit just waits
                let _ = receipt.persistence.await;
                if let Some(extraction) = receipt.extraction {
                    let _ = extraction.await;
                }
            }
            "/quit" | "/exit" | "/q" => return SlashResult::Quit,
            other => println!("{}", format!("unknown command: {}", other).dimmed()),
        }
        SlashResult::Continue
    }

    async fn start_exercise(&mut self, descriptor: &str, mood: u8) {
        match self.exercise.start(descriptor) {
            StartOutcome::PreMoodCapture { flow_name } => {
                println!("{}", format!("Starting \"{}\".", flow_name).bold());
                let event = self.exercise.confirm_pre_mood(mood).await;
                self.render_exercise_event(event);
            }
            StartOutcome::UnknownFlow => {
                println!("{}", format!("I don't know an exercise called \"{}\".", descriptor).dimmed());
            }
            StartOutcome::AlreadyActive => {
                println!("{}", "an exercise is already running".dimmed());
            }
        }
    }

    fn render_chat_event(&self, event: ChatEvent) {
        match event {
            ChatEvent::Replied {
                reply,
                suggestions,
                quota_notice,
            } => {
                println!("{}", reply.text);
                render_suggestions(&suggestions);
                if let Some(notice) = quota_notice {
                    println!("{}", notice.dimmed());
                }
            }
            ChatEvent::QuotaExceeded { notice } | ChatEvent::Fallback { notice } => {
                println!("{}", notice.text.yellow());
            }
            ChatEvent::Stale => {}
        }
    }

    fn render_exercise_event(&mut self, event: ExerciseEvent) {
        match event {
            ExerciseEvent::Deepened { reply, suggestions } => {
                println!("{}", reply.text);
                render_suggestions(&suggestions);
            }
            ExerciseEvent::SteppedForward {
                banner,
                reply,
                suggestions,
            } => {
                println!("{}", banner.text.bold());
                println!("{}", reply.text);
                render_suggestions(&suggestions);
            }
            ExerciseEvent::Completed { closing, recap, .. } => {
                println!("{}", closing.text);
                if let Some(recap) = recap {
                    render_summary(&recap);
                }
                println!("{}", "How do you feel now? (1-5)".dimmed());
                self.awaiting_post_mood = true;
            }
            ExerciseEvent::QuotaExceeded { notice } | ExerciseEvent::Aborted { notice } => {
                println!("{}", notice.text.yellow());
            }
            ExerciseEvent::OutOfPhase => {}
        }
    }

    fn render_reflection_event(&self, event: ReflectionEvent) {
        match event {
            ReflectionEvent::Opened { reply, suggestions } | ReflectionEvent::Continued { reply, suggestions, .. } => {
                println!("{}", reply.text);
                render_suggestions(&suggestions);
            }
            ReflectionEvent::SummaryReady { artifact } => {
                render_summary(&artifact);
                println!("{}", "/save to keep it, /cancel to keep talking".dimmed());
            }
            ReflectionEvent::SummaryFailed => {
                println!("{}", "I couldn't put a summary together this time.".yellow());
            }
            ReflectionEvent::QuotaExceeded { notice } | ReflectionEvent::Fallback { notice } => {
                println!("{}", notice.text.yellow());
            }
            ReflectionEvent::OutOfPhase => {}
        }
    }
}

fn render_suggestions(suggestions: &[String]) {
    for suggestion in suggestions {
        println!("  {} {}", "·".dimmed(), suggestion.dimmed());
    }
}

fn render_summary(artifact: &SummaryArtifact) {
    println!();
    println!("{}", artifact.summary.italic());
    for insight in &artifact.key_insights {
        println!("  {} {}", "-".dimmed(), insight);
    }
    println!();
}

/// Build the engines from loaded configuration
pub fn build_engines(
    config: &crate::config::Config,
    store: Arc<dyn crate::session::SessionStore>,
) -> Result<(SessionEngine, ExerciseFlowEngine, ReflectionEngine)> {
    use crate::context::ContextAssembler;
    use crate::insight::{HttpInsightClient, InsightScheduler};
    use crate::prompts::PromptLoader;
    use crate::quota::{RateLimiter, SubscriptionTier};

    let completion = crate::completion::create_client(&config.completion).map_err(|e| eyre::eyre!(e.to_string()))?;
    let insight_client = Arc::new(HttpInsightClient::from_config(&config.completion).map_err(|e| eyre::eyre!(e.to_string()))?);

    let assembler = ContextAssembler::new(
        PromptLoader::new(std::env::current_dir().unwrap_or_default()),
        config.context.clone(),
        config.profile.clone(),
    );
    let limiter = RateLimiter::new(store.clone());
    let scheduler = InsightScheduler::new(store.clone(), insight_client, config.insight.clone());
    let daily_limit = SubscriptionTier::parse(&config.profile.tier).daily_limit(&config.quota);

    let chat = SessionEngine::new(
        store.clone(),
        completion.clone(),
        assembler.clone(),
        limiter.clone(),
        scheduler.clone(),
        daily_limit,
    );
    let session_id = chat.session_id().to_string();
    let exercise = ExerciseFlowEngine::new(
        store.clone(),
        completion.clone(),
        assembler.clone(),
        limiter.clone(),
        scheduler,
        daily_limit,
        session_id,
    );
    let reflection = ReflectionEngine::new(store, completion, assembler, limiter, daily_limit);

    Ok((chat, exercise, reflection))
}
