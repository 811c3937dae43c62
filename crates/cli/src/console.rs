// Interactive console loop

use anyhow::{Context, Result};
use colored::Colorize;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use kcluster_core::domain::{TopicSpec, KAFKA, ZOOKEEPER};

use crate::app::App;
use crate::output;

const DEFAULT_TOPIC: &str = "sample-topic";
const DEFAULT_PARTITIONS: u32 = 3;
const DEFAULT_REPLICATION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuChoice {
    Status,
    Start(&'static str),
    Stop(&'static str),
    CreateTopic,
    DeleteTopic,
    Exit,
}

const MENU: &[(&str, MenuChoice)] = &[
    ("Show status", MenuChoice::Status),
    ("Run Zookeeper", MenuChoice::Start(ZOOKEEPER)),
    ("Run Kafka", MenuChoice::Start(KAFKA)),
    ("Create topic", MenuChoice::CreateTopic),
    ("Delete topic", MenuChoice::DeleteTopic),
    ("Turn off Kafka", MenuChoice::Stop(KAFKA)),
    ("Turn off Zookeeper", MenuChoice::Stop(ZOOKEEPER)),
    ("Exit", MenuChoice::Exit),
];

fn parse_choice(input: &str) -> Option<MenuChoice> {
    let index: usize = input.trim().parse().ok()?;
    MENU.get(index.checked_sub(1)?).map(|(_, choice)| *choice)
}

struct Prompt {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Ask a question; None on EOF or Ctrl-C
    async fn ask(&mut self, question: &str, default: Option<&str>) -> Result<Option<String>> {
        match default {
            Some(default) => print!("{} ({}): ", question.bold(), default),
            None => print!("{}: ", question.bold()),
        }
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let line = tokio::select! {
            line = self.lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("Pressed CTRL+C...");
                None
            }
        };

        Ok(line.map(|l| {
            let answer = l.trim();
            match (answer.is_empty(), default) {
                (true, Some(default)) => default.to_string(),
                _ => answer.to_string(),
            }
        }))
    }

    async fn ask_number(&mut self, question: &str, default: u32) -> Result<Option<u32>> {
        loop {
            let Some(answer) = self.ask(question, Some(&default.to_string())).await? else {
                return Ok(None);
            };
            match answer.parse() {
                Ok(n) => return Ok(Some(n)),
                Err(_) => println!("{}", "Please enter a whole number".yellow()),
            }
        }
    }
}

/// Run the menu loop until the operator exits, stdin closes or Ctrl-C
pub async fn run(app: &App) -> Result<()> {
    let mut prompt = Prompt::new();

    loop {
        app.supervisor
            .refresh_all()
            .await
            .context("Failed to probe service endpoints")?;
        output::print_status(&app.supervisor, app.inspector.as_ref());
        println!();

        for (i, (label, _)) in MENU.iter().enumerate() {
            println!("  {}) {}", i + 1, label);
        }

        let Some(answer) = prompt.ask("Select an option", None).await? else {
            return Ok(());
        };
        let Some(choice) = parse_choice(&answer) else {
            println!("{}", format!("Unknown option: {}", answer).yellow());
            continue;
        };

        match choice {
            MenuChoice::Status => {}
            MenuChoice::Start(service) => {
                let result = app.start_interruptible(service).await;
                output::print_start(service, &result);
            }
            MenuChoice::Stop(service) => {
                println!(">>> Terminating {}...", service);
                let result = app.supervisor.stop(service).await;
                output::print_stop(service, &result);
            }
            MenuChoice::CreateTopic => {
                if !create_topic(app, &mut prompt).await? {
                    return Ok(());
                }
            }
            MenuChoice::DeleteTopic => {
                if !delete_topic(app, &mut prompt).await? {
                    return Ok(());
                }
            }
            MenuChoice::Exit => return Ok(()),
        }
        println!();
    }
}

/// Returns false when input ended
async fn create_topic(app: &App, prompt: &mut Prompt) -> Result<bool> {
    let Some(name) = prompt
        .ask("A name of topic to create", Some(DEFAULT_TOPIC))
        .await?
    else {
        return Ok(false);
    };
    let Some(partitions) = prompt
        .ask_number("How many partitions", DEFAULT_PARTITIONS)
        .await?
    else {
        return Ok(false);
    };
    let Some(replication) = prompt
        .ask_number("A replication factor", DEFAULT_REPLICATION)
        .await?
    else {
        return Ok(false);
    };

    match TopicSpec::new(name, partitions, replication) {
        Ok(topic) => match app.topics.create(&topic).await {
            Ok(out) => output::print_command_output(&out),
            Err(e) => println!("{} {}", "✗".red().bold(), e),
        },
        Err(e) => println!("{} {}", "✗".red().bold(), e),
    }
    Ok(true)
}

async fn delete_topic(app: &App, prompt: &mut Prompt) -> Result<bool> {
    let Some(name) = prompt
        .ask("A name of topic to remove", Some(DEFAULT_TOPIC))
        .await?
    else {
        return Ok(false);
    };

    match app.topics.delete(&name).await {
        Ok(out) => output::print_command_output(&out),
        Err(e) => println!("{} {}", "✗".red().bold(), e),
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("1"), Some(MenuChoice::Status));
        assert_eq!(parse_choice(" 2 "), Some(MenuChoice::Start(ZOOKEEPER)));
        assert_eq!(parse_choice("7"), Some(MenuChoice::Stop(ZOOKEEPER)));
        assert_eq!(parse_choice("8"), Some(MenuChoice::Exit));
        assert_eq!(parse_choice("0"), None);
        assert_eq!(parse_choice("9"), None);
        assert_eq!(parse_choice("kafka"), None);
    }
}
