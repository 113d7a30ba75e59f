//! Line-oriented exam screen: command parsing and rendering.

use std::fmt;
use std::fmt::Write as _;

use exam_core::model::Question;
use services::{NavigatorSlot, PrimaryAction, SessionView};

pub const HELP: &str = "commands: next (n), prev (p), goto <N>, answer <text|choice number> (a), submit, show, help";

/// One line typed by the student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Show,
    Help,
    Next,
    Previous,
    /// Zero-based question index.
    GoTo(usize),
    Answer(String),
    Submit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Unknown(String),
    MissingArgument { command: &'static str },
    InvalidQuestionNumber { raw: String },
    NotAChoice { raw: String, count: usize },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Unknown(raw) => write!(f, "unknown command: {raw}"),
            CommandError::MissingArgument { command } => write!(f, "{command} requires a value"),
            CommandError::InvalidQuestionNumber { raw } => {
                write!(f, "invalid question number: {raw}")
            }
            CommandError::NotAChoice { raw, count } => {
                write!(f, "\"{raw}\" is not a choice; enter a number from 1 to {count}")
            }
        }
    }
}

impl std::error::Error for CommandError {}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word {
            "" | "show" => Ok(Self::Show),
            "help" | "?" => Ok(Self::Help),
            "n" | "next" => Ok(Self::Next),
            "p" | "prev" | "previous" => Ok(Self::Previous),
            "submit" => Ok(Self::Submit),
            "g" | "goto" => {
                if rest.is_empty() {
                    return Err(CommandError::MissingArgument { command: "goto" });
                }
                match rest.parse::<usize>() {
                    Ok(number) if number > 0 => Ok(Self::GoTo(number - 1)),
                    _ => Err(CommandError::InvalidQuestionNumber {
                        raw: rest.to_owned(),
                    }),
                }
            }
            "a" | "answer" => {
                if rest.is_empty() {
                    return Err(CommandError::MissingArgument { command: "answer" });
                }
                Ok(Self::Answer(rest.to_owned()))
            }
            _ => Err(CommandError::Unknown(word.to_owned())),
        }
    }
}

/// Turn typed input into the stored answer for `question`.
///
/// Single-choice questions accept the exact choice text, or else a one-based
/// choice number; free-text questions store the input as typed.
pub fn resolve_answer(question: &Question, input: &str) -> Result<String, CommandError> {
    let Some(choices) = question.choices() else {
        return Ok(input.to_owned());
    };

    if let Some(choice) = choices.iter().find(|c| c.as_str() == input) {
        return Ok(choice.clone());
    }
    if let Some(choice) = input
        .parse::<usize>()
        .ok()
        .and_then(|number| number.checked_sub(1))
        .and_then(|i| choices.get(i))
    {
        return Ok(choice.clone());
    }

    Err(CommandError::NotAChoice {
        raw: input.to_owned(),
        count: choices.len(),
    })
}

fn slot_marker(slot: NavigatorSlot) -> &'static str {
    match slot {
        NavigatorSlot::Current => "[>]",
        NavigatorSlot::Answered => "[x]",
        NavigatorSlot::Unanswered => "[ ]",
    }
}

pub fn render(view: &SessionView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} | {}", view.title, view.subject);
    let _ = writeln!(
        out,
        "time left {}   {}   answered {}/{} ({:.0}%)",
        view.time_left,
        view.position_label,
        view.answered_count,
        view.total_questions,
        view.progress_percent
    );
    let navigator: Vec<&str> = view.navigator.iter().copied().map(slot_marker).collect();
    let _ = writeln!(out, "{}", navigator.join(""));
    let _ = writeln!(out);
    let _ = writeln!(out, "{}. {}", view.question.number, view.question.prompt);

    let answer = view.question.answer.as_deref();
    match &view.question.choices {
        Some(choices) => {
            for (i, choice) in choices.iter().enumerate() {
                let marker = if answer == Some(choice.as_str()) { ">" } else { " " };
                let _ = writeln!(out, "{marker} {}) {choice}", i + 1);
            }
        }
        None => {
            let _ = writeln!(out, "  answer: {}", answer.unwrap_or("(none)"));
        }
    }

    let _ = writeln!(out);
    let forward = match view.primary_action {
        PrimaryAction::Next => "next",
        PrimaryAction::SubmitExam => "next = submit exam",
    };
    if view.can_go_back {
        let _ = write!(out, "[prev] [{forward}]");
    } else {
        let _ = write!(out, "[{forward}]");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{AttemptId, ExamDefinition, ExamId, QuestionId, UserId};
    use exam_core::time::fixed_now;
    use services::ExamSession;
    use std::sync::Arc;

    fn choice_question() -> Question {
        Question::single_choice(
            QuestionId::new(1),
            "What is the value of x in the equation 2x + 5 = 13?",
            vec!["x = 3".into(), "x = 4".into(), "x = 5".into()],
        )
        .unwrap()
    }

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!(Command::parse(""), Ok(Command::Show));
        assert_eq!(Command::parse("  n "), Ok(Command::Next));
        assert_eq!(Command::parse("prev"), Ok(Command::Previous));
        assert_eq!(Command::parse("goto 3"), Ok(Command::GoTo(2)));
        assert_eq!(
            Command::parse("answer  use the formula  "),
            Ok(Command::Answer("use the formula".into()))
        );
        assert_eq!(Command::parse("submit"), Ok(Command::Submit));
    }

    #[test]
    fn rejects_bad_commands() {
        assert_eq!(
            Command::parse("jump"),
            Err(CommandError::Unknown("jump".into()))
        );
        assert_eq!(
            Command::parse("goto 0"),
            Err(CommandError::InvalidQuestionNumber { raw: "0".into() })
        );
        assert_eq!(
            Command::parse("goto"),
            Err(CommandError::MissingArgument { command: "goto" })
        );
        assert_eq!(
            Command::parse("a"),
            Err(CommandError::MissingArgument { command: "answer" })
        );
    }

    #[test]
    fn resolves_choice_numbers_and_text() {
        let question = choice_question();
        assert_eq!(resolve_answer(&question, "2").unwrap(), "x = 4");
        assert_eq!(resolve_answer(&question, "x = 5").unwrap(), "x = 5");
        assert_eq!(
            resolve_answer(&question, "4"),
            Err(CommandError::NotAChoice {
                raw: "4".into(),
                count: 3
            })
        );
        assert!(resolve_answer(&question, "x = 9").is_err());

        let free = Question::free_text(QuestionId::new(2), "Explain.").unwrap();
        assert_eq!(resolve_answer(&free, "2").unwrap(), "2");
    }

    #[test]
    fn numeric_choice_text_wins_over_position() {
        let question = Question::single_choice(
            QuestionId::new(4),
            "Which of these is 2 squared?",
            vec!["2".into(), "4".into(), "6".into(), "8".into(), "10".into()],
        )
        .unwrap();
        assert_eq!(resolve_answer(&question, "4").unwrap(), "4");
        assert_eq!(resolve_answer(&question, "10").unwrap(), "10");
        assert_eq!(resolve_answer(&question, "3").unwrap(), "6");
        assert_eq!(
            resolve_answer(&question, "7"),
            Err(CommandError::NotAChoice {
                raw: "7".into(),
                count: 5
            })
        );
    }

    #[test]
    fn render_marks_selected_choice_and_navigator() {
        let exam = ExamDefinition::new(
            ExamId::new(1),
            "Algebra Midterm",
            "Math",
            60,
            vec![
                choice_question(),
                Question::free_text(QuestionId::new(2), "Explain.").unwrap(),
            ],
        )
        .unwrap();
        let mut session =
            ExamSession::new(AttemptId::generate(), UserId::new(3), Arc::new(exam), fixed_now());
        session.record_answer(QuestionId::new(1), "x = 4").unwrap();

        let screen = render(&SessionView::from_session(&session));
        assert!(screen.starts_with("Algebra Midterm | Math\n"));
        assert!(screen.contains("time left 1:00:00"));
        assert!(screen.contains("[>][ ]"));
        assert!(screen.contains("> 2) x = 4"));
        assert!(screen.ends_with("[next]"));

        session.next().unwrap();
        let screen = render(&SessionView::from_session(&session));
        assert!(screen.contains("[x][>]"));
        assert!(screen.contains("answer: (none)"));
        assert!(screen.ends_with("[prev] [next = submit exam]"));
    }
}
