use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// A scraped forum post. Read-only to the query side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    /// Forum section the post was scraped from (e.g. `forums.iracing.com`).
    pub source: String,
    pub author: String,
    /// Raw date string as scraped; see [`Post::display_date`].
    pub date: String,
    pub text: String,
    pub comment_id: Option<String>,
}

/// A post about to be written, before the store assigns its id.
#[derive(Debug, Clone)]
pub struct NewPost<'a> {
    pub source: &'a str,
    pub author: &'a str,
    pub date: &'a str,
    pub text: &'a str,
    pub comment_id: Option<&'a str>,
}

/// One ranked hit. `similarity` is `1 - cosine distance`, higher is closer.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub post: Post,
    pub similarity: f64,
}

impl Post {
    /// Human-readable date.
    ///
    /// Some scraped pages stored the inline script that renders the date
    /// instead of the date itself; those are reported as unavailable.
    #[must_use]
    pub fn display_date(&self) -> String {
        let date = self.date.trim();
        if date.is_empty() {
            return "Unknown date".to_string();
        }
        if date.contains("function") || date.contains("var loc") {
            return "Date not available".to_string();
        }
        if date.contains('T') && (date.contains('+') || date.ends_with('Z')) {
            if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
                return dt.format("%Y-%m-%d %H:%M").to_string();
            }
        }
        date.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_with_date(date: &str) -> Post {
        Post {
            id: 1,
            source: "forums.iracing.com".to_string(),
            author: "someone".to_string(),
            date: date.to_string(),
            text: "text".to_string(),
            comment_id: None,
        }
    }

    #[test]
    fn test_display_date_empty() {
        assert_eq!(post_with_date("").display_date(), "Unknown date");
    }

    #[test]
    fn test_display_date_script() {
        let post = post_with_date("var loc = new Date(); function render() {}");
        assert_eq!(post.display_date(), "Date not available");
    }

    #[test]
    fn test_display_date_rfc3339() {
        assert_eq!(
            post_with_date("2023-04-05T17:22:10+00:00").display_date(),
            "2023-04-05 17:22"
        );
        assert_eq!(
            post_with_date("2023-04-05T17:22:10Z").display_date(),
            "2023-04-05 17:22"
        );
    }

    #[test]
    fn test_display_date_passthrough() {
        assert_eq!(post_with_date("April 2023").display_date(), "April 2023");
        // looks like ISO but does not parse
        assert_eq!(
            post_with_date("2023-13-45T99:00+00").display_date(),
            "2023-13-45T99:00+00"
        );
    }
}
