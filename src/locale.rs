//! User-facing strings (Russian).

use crate::survey::model::SurveyStatus;

pub const START_PROMPT: &str = "Введите своё ФИО после команды /auth";
pub const ALREADY_AUTHENTICATED: &str = "Вы уже авторизованы";
pub const INVALID_FULL_NAME: &str = "Неверный формат ФИО";
pub const AUTHENTICATED: &str = "Вы успешно авторизованы";
pub const NOT_AUTHENTICATED: &str = "Вы не авторизованы";
pub const INVALID_SURVEY_CODE: &str = "Неверный формат идентификатора опроса";
pub const SURVEY_COMPLETED: &str = "Спасибо за прохождение опроса!";

pub const AUTH_COMMAND_DESCRIPTION: &str = "Авторизация в системе";
pub const JOIN_COMMAND_DESCRIPTION: &str = "Подключение к опросу";

/// Display label for a survey status.
pub fn survey_status_label(status: SurveyStatus) -> &'static str {
    match status {
        SurveyStatus::NotStarted => "Не начато",
        SurveyStatus::InProgress => "В процессе",
        SurveyStatus::Finished => "Завершено",
    }
}

pub fn already_joined(code: &str) -> String {
    format!("Вы уже присоединились к опросу {code}")
}

pub fn survey_not_found(code: &str) -> String {
    format!("Опрос {code} не существует")
}

pub fn joined(code: &str) -> String {
    format!("Вы присоединились к опросу {code}")
}

pub fn question_prompt(index: i64, title: &str) -> String {
    format!("Вопрос №{index}: {title}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_status_has_a_label() {
        assert_eq!(survey_status_label(SurveyStatus::NotStarted), "Не начато");
        assert_eq!(survey_status_label(SurveyStatus::InProgress), "В процессе");
        assert_eq!(survey_status_label(SurveyStatus::Finished), "Завершено");
    }

    #[test]
    fn question_prompt_includes_index_and_title() {
        assert_eq!(question_prompt(3, "Как дела?"), "Вопрос №3: Как дела?");
    }
}
