//! Bot command parsing.

use std::sync::LazyLock;

use regex::Regex;

/// Three capitalised words: second name, first name, middle name.
static FULL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    let word = r"\p{Lu}\p{Ll}+(?:-\p{Lu}\p{Ll}+)?";
    Regex::new(&format!(r"^({word})\s+({word})\s+({word})$")).unwrap()
});

/// Survey short code: four uppercase letters or digits, standing alone.
static SURVEY_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z0-9]{4}\b").unwrap());

/// A recognised slash command with its argument text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand<'a> {
    Start,
    Auth(&'a str),
    Join(&'a str),
    Unknown(&'a str),
}

impl<'a> BotCommand<'a> {
    /// Parse `/name[@bot] args`. Returns `None` for non-command text.
    pub fn parse(text: &'a str) -> Option<Self> {
        let text = text.trim_start();
        let rest = text.strip_prefix('/')?;

        let (head, args) = match rest.find(char::is_whitespace) {
            Some(pos) => (&rest[..pos], rest[pos..].trim()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or(head);

        Some(match name {
            "start" => Self::Start,
            "auth" => Self::Auth(args),
            "join" => Self::Join(args),
            _ => Self::Unknown(name),
        })
    }
}

/// Respondent name as entered after `/auth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullName {
    pub second_name: String,
    pub first_name: String,
    pub middle_name: String,
}

/// Accepts exactly three whitespace-separated capitalised words.
pub fn parse_full_name(args: &str) -> Option<FullName> {
    let caps = FULL_NAME_RE.captures(args.trim())?;
    Some(FullName {
        second_name: caps[1].to_string(),
        first_name: caps[2].to_string(),
        middle_name: caps[3].to_string(),
    })
}

/// First four-character uppercase alphanumeric token in `args`.
pub fn parse_survey_code(args: &str) -> Option<&str> {
    SURVEY_CODE_RE.find(args).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Command parsing ─────────────────────────────────────────────

    #[test]
    fn parses_known_commands() {
        assert_eq!(BotCommand::parse("/start"), Some(BotCommand::Start));
        assert_eq!(
            BotCommand::parse("/auth Иванов Иван Иванович"),
            Some(BotCommand::Auth("Иванов Иван Иванович"))
        );
        assert_eq!(
            BotCommand::parse("/join   AB12  "),
            Some(BotCommand::Join("AB12"))
        );
    }

    #[test]
    fn strips_bot_mention() {
        assert_eq!(
            BotCommand::parse("/join@survey_bot AB12"),
            Some(BotCommand::Join("AB12"))
        );
    }

    #[test]
    fn command_without_args_has_empty_args() {
        assert_eq!(BotCommand::parse("/auth"), Some(BotCommand::Auth("")));
    }

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(BotCommand::parse("hello /auth"), None);
        assert_eq!(BotCommand::parse(""), None);
    }

    #[test]
    fn unknown_command_is_reported() {
        assert_eq!(BotCommand::parse("/help me"), Some(BotCommand::Unknown("help")));
    }

    // ── Full name ───────────────────────────────────────────────────

    #[test]
    fn accepts_three_capitalised_words() {
        let name = parse_full_name("Иванов Иван Иванович").unwrap();
        assert_eq!(name.second_name, "Иванов");
        assert_eq!(name.first_name, "Иван");
        assert_eq!(name.middle_name, "Иванович");
    }

    #[test]
    fn accepts_latin_and_hyphenated_names() {
        assert!(parse_full_name("Smith John Paul").is_some());
        let name = parse_full_name("Петрова-Водкина Анна  Сергеевна").unwrap();
        assert_eq!(name.second_name, "Петрова-Водкина");
    }

    #[test]
    fn rejects_other_shapes() {
        for bad in [
            "",
            "Иванов Иван",
            "Иванов Иван Иванович Младший",
            "иванов Иван Иванович",
            "Иванов иван Иванович",
            "ИВАНОВ Иван Иванович",
            "Иванов1 Иван Иванович",
            "И Иван Иванович",
        ] {
            assert_eq!(parse_full_name(bad), None, "{bad:?} should be rejected");
        }
    }

    // ── Survey code ─────────────────────────────────────────────────

    #[test]
    fn finds_survey_code() {
        assert_eq!(parse_survey_code("AB12"), Some("AB12"));
        assert_eq!(parse_survey_code("code 9Z9Z please"), Some("9Z9Z"));
    }

    #[test]
    fn rejects_malformed_codes() {
        assert_eq!(parse_survey_code(""), None);
        assert_eq!(parse_survey_code("ab12"), None);
        assert_eq!(parse_survey_code("AB1"), None);
        assert_eq!(parse_survey_code("AB123"), None);
    }
}
