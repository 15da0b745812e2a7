use rustyline::{DefaultEditor, error::ReadlineError};

use crate::{
    diagnostics::{ReplError, Result},
    session::{PassOutcome, PassReport, Session},
};

/// Line-by-line pad: every entered line is appended to the buffer and the
/// whole buffer is re-evaluated.
pub struct Repl {
    session: Session,
    buffer: Vec<String>,
    column_width: usize,
}

impl Repl {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            buffer: Vec::new(),
            column_width: 40,
        }
    }

    pub fn with_column_width(mut self, column_width: usize) -> Self {
        self.column_width = column_width;
        self
    }

    pub fn source(&self) -> String {
        self.buffer.join("\n")
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().map_err(readline_error)?;
        loop {
            match editor.readline(">> ") {
                Ok(line) => {
                    let trimmed = line.trim();
                    match trimmed {
                        "" => continue,
                        ":quit" | ":exit" => break,
                        ":clear" => {
                            self.buffer.clear();
                            println!("(buffer cleared)");
                            continue;
                        }
                        ":show" => {
                            self.print_all().await;
                            continue;
                        }
                        ":link" => {
                            println!("{}", self.session.link(&self.source()));
                            continue;
                        }
                        ":undo" => {
                            self.buffer.pop();
                            self.print_all().await;
                            continue;
                        }
                        _ => {}
                    }
                    editor.add_history_entry(trimmed).ok();
                    let first_line = self.source().split('\n').count();
                    let first_line = if self.buffer.is_empty() { 0 } else { first_line };
                    self.buffer.push(line);
                    if let Some(report) = self.pass().await {
                        print_rows(&report, first_line, self.column_width);
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(readline_error(err)),
            }
        }
        Ok(())
    }

    async fn pass(&self) -> Option<PassReport> {
        match self.session.run_pass(&self.source()).await {
            PassOutcome::Completed(report) => Some(report),
            PassOutcome::Superseded { .. } => None,
        }
    }

    async fn print_all(&self) {
        if let Some(report) = self.pass().await {
            print_rows(&report, 0, self.column_width);
        }
    }
}

fn print_rows(report: &PassReport, first_line: usize, column_width: usize) {
    let table = report.render_table(column_width);
    for line in table.lines().skip(first_line) {
        println!("{line}");
    }
    for message in &report.console {
        println!("[{}] {}", message.kind, message.text);
    }
}

fn readline_error(err: ReadlineError) -> ReplError {
    ReplError::from(std::io::Error::other(err))
}
