use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// A JSON field that may be absent, explicitly `null`, or set.
///
/// `None` means the key was not in the document, `Some(None)` means it was `null`.
/// Keeping the two apart lets an untouched bank serialize back the way it was read.
pub type Field<T> = Option<Option<T>>;

fn present<'de, D, T>(deserializer: D) -> Result<Field<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn field_str(field: &Field<String>) -> Option<&str> {
    field.as_ref().and_then(|value| value.as_deref())
}

/// Whether an image reference actually points somewhere.
/// Empty strings and the literal `"null"` left behind by older imports do not.
pub fn is_image(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && trimmed != "null"
}

pub fn is_remote_url(value: &str) -> bool {
    Url::parse(value.trim()).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub exam_id: String,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub exam_name: Field<String>,
    pub questions: Vec<Question>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub question_text: Field<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_url: Field<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<IndexMap<String, AnswerOption>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub explanation: Field<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub category: Field<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One answer choice. The bank holds both shapes side by side.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum AnswerOption {
    Plain(String),
    Illustrated(IllustratedOption),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IllustratedOption {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub text: Field<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_url: Field<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Exam {
    pub fn new(exam_id: &str, exam_name: &str, questions: Vec<Question>) -> Exam {
        Exam {
            exam_id: exam_id.to_string(),
            exam_name: Some(Some(exam_name.to_string())),
            questions,
            extra: Map::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        field_str(&self.exam_name)
    }
}

impl Question {
    pub fn text(&self) -> &str {
        field_str(&self.question_text).unwrap_or_default()
    }

    pub fn main_image(&self) -> Option<&str> {
        field_str(&self.image_url).filter(|image| is_image(image))
    }

    pub fn set_main_image(&mut self, image: &str) {
        self.image_url = Some(Some(image.to_string()));
    }

    /// Option key -> image for every option that carries one.
    pub fn option_images(&self) -> IndexMap<String, String> {
        self.options
            .iter()
            .flatten()
            .filter_map(|(key, option)| option.image().map(|image| (key.clone(), image.to_string())))
            .collect()
    }

    /// Text of every option joined with spaces, image-only options contribute nothing.
    pub fn options_text(&self) -> String {
        self.options
            .iter()
            .flatten()
            .filter_map(|(_, option)| option.text())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn explanation(&self) -> Option<&str> {
        field_str(&self.explanation)
    }

    pub fn category(&self) -> Option<&str> {
        field_str(&self.category)
    }
}

impl AnswerOption {
    pub fn text(&self) -> Option<&str> {
        match self {
            AnswerOption::Plain(text) => Some(text),
            AnswerOption::Illustrated(option) => field_str(&option.text),
        }
    }

    pub fn image(&self) -> Option<&str> {
        match self {
            AnswerOption::Plain(_) => None,
            AnswerOption::Illustrated(option) => {
                field_str(&option.image_url).filter(|image| is_image(image))
            }
        }
    }

    /// Turns a plain label into the structured form, keeping its text.
    pub fn upgrade(&mut self) -> &mut IllustratedOption {
        if let AnswerOption::Plain(text) = self {
            *self = AnswerOption::Illustrated(IllustratedOption {
                text: Some(Some(std::mem::take(text))),
                ..Default::default()
            });
        }
        match self {
            AnswerOption::Illustrated(option) => option,
            AnswerOption::Plain(_) => unreachable!("option was upgraded above"),
        }
    }

    pub fn set_image(&mut self, image: &str) {
        self.upgrade().image_url = Some(Some(image.to_string()));
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::{Exam, Question};
    use serde_json::{json, Value};

    pub fn exam(exam_id: &str, questions: Value) -> Exam {
        serde_json::from_value(json!({
            "examId": exam_id,
            "examName": format!("Deneme {exam_id}"),
            "questions": questions,
        }))
        .unwrap()
    }

    pub fn question(value: Value) -> Question {
        serde_json::from_value(value).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::question;
    use super::*;
    use serde_json::json;

    #[test]
    fn both_option_shapes_deserialize() {
        let q = question(json!({
            "id": 3,
            "questionText": "Hangisi?",
            "options": {
                "A": "Kırmızı ışık",
                "B": { "text": "Sarı", "imageUrl": "assets/images/b.png" },
                "C": { "text": "Yeşil", "imageUrl": null }
            },
            "correctAnswer": "A"
        }));
        let options = q.options.as_ref().unwrap();
        assert_eq!(options["A"], AnswerOption::Plain("Kırmızı ışık".to_string()));
        assert_eq!(options["B"].image(), Some("assets/images/b.png"));
        assert_eq!(options["C"].image(), None);
        assert_eq!(q.extra["correctAnswer"], json!("A"));
    }

    #[test]
    fn upgrade_keeps_option_text() {
        let mut option = AnswerOption::Plain("Kırmızı ışık".to_string());
        option.set_image("c.png");
        assert_eq!(option.text(), Some("Kırmızı ışık"));
        assert_eq!(option.image(), Some("c.png"));
        assert_eq!(
            serde_json::to_value(&option).unwrap(),
            json!({ "text": "Kırmızı ışık", "imageUrl": "c.png" })
        );
    }

    #[test]
    fn placeholder_images_are_not_images() {
        let q = question(json!({ "id": 1, "questionText": "x", "imageUrl": "null" }));
        assert_eq!(q.main_image(), None);
        assert!(!is_image("   "));
        assert!(is_image("assets/images/a.png"));
    }

    #[test]
    fn untouched_question_round_trips() {
        let value = json!({
            "id": 7,
            "questionText": "Soru",
            "imageUrl": null,
            "options": { "B": "ikinci", "A": "birinci" },
            "correctAnswer": "B",
            "explanation": null
        });
        let q = question(value.clone());
        assert_eq!(serde_json::to_value(&q).unwrap(), value);
        let text = serde_json::to_string(&q).unwrap();
        assert!(text.find("\"B\"").unwrap() < text.find("\"A\"").unwrap());
    }

    #[test]
    fn remote_urls_are_recognized() {
        assert!(is_remote_url("https://example.com/a.png"));
        assert!(is_remote_url("HTTP://example.com/a"));
        assert!(!is_remote_url("assets/images/a.png"));
        assert!(!is_remote_url("ftp://example.com/a.png"));
    }
}
