//! Interactive question loop used by the `forumrag` binary.
use std::io::{self, BufRead, Write};

use crate::error::Error;
use crate::query::ForumQuerySystem;

const HELP: &str = "\nCommands:
  help - Show this help message
  search <query> - Search for similar posts
  ask <question> - Ask a question (uses AI)
  post <id> - Get a specific post by ID
  quit - Exit the program
";

/// One parsed input line.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Search(String),
    Ask(String),
    /// `None` when the argument is not a number.
    Post(Option<i64>),
    /// A command word with nothing after it.
    Usage(&'static str),
    Empty,
}

/// Parse one line. Command words are case-insensitive; anything that is
/// not a command is treated as a question.
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_ascii_lowercase().as_str() {
        "quit" | "exit" | "q" if rest.is_empty() => Command::Quit,
        "help" if rest.is_empty() => Command::Help,
        "search" if rest.is_empty() => Command::Usage("Please provide a search query."),
        "search" => Command::Search(rest.to_string()),
        "ask" if rest.is_empty() => Command::Usage("Please provide a question."),
        "ask" => Command::Ask(rest.to_string()),
        "post" => Command::Post(rest.parse().ok()),
        _ => Command::Ask(line.to_string()),
    }
}

/// Read commands from `input` until `quit` or end of input, writing results
/// to `out`. Query errors are reported and the loop continues.
pub fn run<R: BufRead, W: Write>(
    system: &ForumQuerySystem,
    input: R,
    out: &mut W,
) -> io::Result<()> {
    writeln!(out, "iRacing Forum Query System")?;
    writeln!(out, "{}", "=".repeat(40))?;
    writeln!(out, "Type 'quit' to exit, 'help' for commands\n")?;

    let mut lines = input.lines();
    loop {
        write!(out, "Query: ")?;
        out.flush()?;

        let Some(line) = lines.next() else {
            writeln!(out)?;
            break;
        };

        match parse_command(&line?) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Usage(hint) => writeln!(out, "{hint}")?,
            Command::Search(query) => search(system, &query, out)?,
            Command::Ask(question) => ask(system, &question, out)?,
            Command::Post(id) => post(system, id, out)?,
        }
    }

    writeln!(out, "Goodbye!")?;
    Ok(())
}

fn search<W: Write>(system: &ForumQuerySystem, query: &str, out: &mut W) -> io::Result<()> {
    writeln!(out, "\nSearching for: '{query}'")?;
    match system.search(query, system.top_k()) {
        Ok(results) if results.is_empty() => writeln!(out, "No relevant posts found.")?,
        Ok(results) => {
            writeln!(out, "\nFound {} relevant posts:", results.len())?;
            for (i, result) in results.iter().enumerate() {
                writeln!(
                    out,
                    "\n{}. {} ({}) - Score: {:.3}",
                    i + 1,
                    result.post.author,
                    result.post.display_date(),
                    result.similarity
                )?;
                writeln!(out, "   {}", result.post.text)?;
            }
        }
        Err(e) => writeln!(out, "Error: {e}")?,
    }
    writeln!(out)
}

fn ask<W: Write>(system: &ForumQuerySystem, question: &str, out: &mut W) -> io::Result<()> {
    writeln!(out, "\nQuestion: {question}")?;
    writeln!(out, "Thinking...")?;
    match system.ask(question) {
        Ok(answer) => writeln!(out, "\nAnswer: {answer}")?,
        Err(e) => writeln!(out, "Error: {e}")?,
    }
    writeln!(out)
}

fn post<W: Write>(system: &ForumQuerySystem, id: Option<i64>, out: &mut W) -> io::Result<()> {
    let Some(id) = id else {
        return writeln!(out, "Please provide a valid post ID number.\n");
    };

    match system.get_post(id) {
        Ok(post) => {
            writeln!(out, "\nPost {id}:")?;
            writeln!(out, "Author: {}", post.author)?;
            writeln!(out, "Date: {}", post.display_date())?;
            writeln!(out, "Source: {}", post.source)?;
            writeln!(out, "Text: {}", post.text)?;
        }
        Err(Error::NotFound(_)) => writeln!(out, "Post {id} not found.")?,
        Err(e) => writeln!(out, "Error: {e}")?,
    }
    writeln!(out)
}
