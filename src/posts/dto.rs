use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostPayload {
    #[validate(length(min = 3, max = 100))]
    pub title: String,
    #[validate(length(min = 3, max = 1000))]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Absent fields keep their stored value.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePostPayload {
    #[validate(length(min = 3, max = 100))]
    pub title: Option<String>,
    #[validate(length(min = 3, max = 1000))]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentPayload {
    #[validate(length(min = 3, max = 1000))]
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_validates_only_present_fields() {
        let empty = UpdatePostPayload {
            title: None,
            content: None,
        };
        assert!(empty.validate().is_ok());

        let short = UpdatePostPayload {
            title: Some("no".into()),
            content: None,
        };
        assert!(short.validate().is_err());
    }

    #[test]
    fn post_bounds() {
        let post = |title: &str, content: &str| CreatePostPayload {
            title: title.into(),
            content: content.into(),
            tags: vec![],
        };
        assert!(post("hello", "world").validate().is_ok());
        assert!(post("hi", "world").validate().is_err());
        assert!(post("hello", &"x".repeat(1001)).validate().is_err());
    }
}
