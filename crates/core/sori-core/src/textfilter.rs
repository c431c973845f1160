//! Text filtering for speech synthesis
//!
//! Raw chat messages contain markup that sounds terrible when read aloud.
//! Mentions become "멘션" and links become "링크" before synthesis.

use std::sync::OnceLock;

use regex::Regex;

fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<@!?\d+>").expect("valid mention pattern"))
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"https?://\S+").expect("valid url pattern"))
}

/// Rewrite a chat message into something worth speaking.
pub fn filter_message_for_tts(content: &str) -> String {
    let content = mention_pattern().replace_all(content, "멘션");
    url_pattern().replace_all(&content, "링크").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mentions_are_replaced() {
        assert_eq!(filter_message_for_tts("hi <@1234567890>"), "hi 멘션");
        assert_eq!(filter_message_for_tts("<@!987> hello"), "멘션 hello");
    }

    #[test]
    fn test_urls_are_replaced() {
        assert_eq!(
            filter_message_for_tts("see https://example.com/a?b=c now"),
            "see 링크 now"
        );
        assert_eq!(filter_message_for_tts("http://a.b"), "링크");
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(filter_message_for_tts("안녕하세요"), "안녕하세요");
    }
}
