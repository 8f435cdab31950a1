//! Script instruction template and reply parsing.

use serde::Deserialize;
use tracing::warn;

use crate::error::{Result, VideoError};

/// System instruction sent with every script request.
pub fn system_instruction(language: &str) -> String {
    format!(
        r#"You are an expert short-form video content creator. You write engaging, viral scripts for short vertical videos.

INSTRUCTIONS:
1. Write a structured script made of distinct scenes
2. Every scene must be visual and impactful
3. The tone must be dynamic and captivating
4. Adapt the length of the narration to the requested number of seconds when read aloud
5. Use more scenes for longer videos; 3 to 5 scenes is usually right
6. Every scene must be illustratable by a single image
7. Write the narration in {language}

RESPONSE FORMAT:
Return only a JSON object, with no other text:
{{"script": "<the full narration>", "scenes": ["<visual description of scene 1>", "<visual description of scene 2>"]}}"#,
    )
}

pub fn user_message(prompt: &str, duration: u32) -> String {
    format!(
        "Create a {}-second short video script about the following topic: {}",
        duration, prompt
    )
}

/// Narration plus scene descriptions extracted from a model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedScript {
    pub script_text: String,
    pub scenes: Vec<String>,
}

#[derive(Deserialize)]
struct ScriptJson {
    #[serde(alias = "script_text", alias = "narration")]
    script: String,
    scenes: Vec<SceneJson>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SceneJson {
    Text(String),
    Described { description: String },
}

/// Parses a model reply, trying JSON first, then a `Script:` / `Scenes:`
/// sectioned reply, then treating the whole reply as narration.
pub fn parse_reply(reply: &str, max_scenes: usize) -> Result<ParsedScript> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(VideoError::Generation("text model returned empty content".to_string()));
    }

    let mut parsed = match parse_json(reply) {
        Some(parsed) => parsed?,
        None => parse_sections(reply).unwrap_or_else(|| parse_sentences(reply)),
    };

    parsed.scenes.retain(|s| !s.trim().is_empty());
    if parsed.script_text.trim().is_empty() {
        return Err(VideoError::Generation("reply contained no narration text".to_string()));
    }
    if parsed.scenes.is_empty() {
        return Err(VideoError::Generation("reply contained no scenes".to_string()));
    }
    if parsed.scenes.len() > max_scenes {
        warn!(
            "Script has {} scenes, keeping the first {}",
            parsed.scenes.len(),
            max_scenes
        );
        parsed.scenes.truncate(max_scenes);
    }

    Ok(parsed)
}

/// `None` when the reply holds no JSON object at all. A reply that carries
/// JSON the script shape cannot be read from is an error, not prose.
fn parse_json(reply: &str) -> Option<Result<ParsedScript>> {
    // Models wrap JSON in markdown fences and sometimes lead with prose
    let start = reply.find('{');
    let end = reply.rfind('}');
    let candidate = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ if looks_like_json(reply) => {
            return Some(Err(VideoError::Generation(
                "reply is unterminated JSON".to_string(),
            )))
        }
        _ => return None,
    };

    let value: serde_json::Value = match serde_json::from_str(candidate) {
        Ok(value) => value,
        Err(e) if looks_like_json(reply) => {
            return Some(Err(VideoError::Generation(format!("reply is malformed JSON: {}", e))))
        }
        Err(_) => return None,
    };

    let data: ScriptJson = match serde_json::from_value(value) {
        Ok(data) => data,
        Err(e) => {
            return Some(Err(VideoError::Generation(format!(
                "reply JSON has no script and scenes: {}",
                e
            ))))
        }
    };

    Some(Ok(ParsedScript {
        script_text: data.script.trim().to_string(),
        scenes: data
            .scenes
            .into_iter()
            .map(|s| match s {
                SceneJson::Text(t) => t.trim().to_string(),
                SceneJson::Described { description } => description.trim().to_string(),
            })
            .collect(),
    }))
}

fn looks_like_json(reply: &str) -> bool {
    reply.starts_with('{') || reply.contains("```json")
}

const SCRIPT_MARKERS: &[&str] = &["Script:", "SCRIPT:"];
const SCENE_MARKERS: &[&str] = &["Scenes:", "SCENES:", "Scènes:", "Scenes :", "Scènes :"];

fn parse_sections(reply: &str) -> Option<ParsedScript> {
    let script_at = SCRIPT_MARKERS.iter().find_map(|m| reply.find(m).map(|i| (i, m.len())))?;
    let body = &reply[script_at.0 + script_at.1..];

    let (script_text, scenes_text) = match SCENE_MARKERS.iter().find_map(|m| body.find(m).map(|i| (i, m.len()))) {
        Some((idx, len)) => (&body[..idx], &body[idx + len..]),
        None => (body, ""),
    };

    let scenes = scenes_text
        .lines()
        .map(str::trim)
        .filter_map(numbered_line)
        .collect();

    Some(ParsedScript {
        script_text: script_text.trim().to_string(),
        scenes,
    })
}

/// `"3. A busy street"` -> `Some("A busy street")` for indices 1 to 9.
fn numbered_line(line: &str) -> Option<String> {
    let mut chars = line.chars();
    let digit = chars.next()?;
    if !('1'..='9').contains(&digit) || chars.next()? != '.' {
        return None;
    }
    let rest = line[2..].trim();
    (!rest.is_empty()).then(|| rest.to_string())
}

fn parse_sentences(reply: &str) -> ParsedScript {
    let sentences: Vec<&str> = reply
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let scenes = sentences
        .chunks(2)
        .map(|pair| format!("{}.", pair.join(". ")))
        .collect();

    ParsedScript {
        script_text: reply.to_string(),
        scenes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json() {
        let reply = "```json\n{\"script\": \"Wake up. Stretch.\", \"scenes\": [\"Alarm clock\", \"Yoga mat\"]}\n```";
        let parsed = parse_reply(reply, 10).unwrap();
        assert_eq!(parsed.script_text, "Wake up. Stretch.");
        assert_eq!(parsed.scenes, vec!["Alarm clock", "Yoga mat"]);
    }

    #[test]
    fn parses_json_after_leading_prose() {
        let reply = "Here is your script:\n```json\n{\"script\": \"Wake up early. Drink water.\", \"scenes\": [\"Sunrise\", \"Water glass\"]}\n```\nEnjoy!";
        let parsed = parse_reply(reply, 10).unwrap();
        assert_eq!(parsed.script_text, "Wake up early. Drink water.");
        assert_eq!(parsed.scenes, vec!["Sunrise", "Water glass"]);
    }

    #[test]
    fn json_with_unknown_keys_is_generation_failure() {
        let reply = r#"{"narration_text": "Wake up early. Drink water.", "scene_list": ["Sunrise", "Water glass"]}"#;
        let err = parse_reply(reply, 10).unwrap_err();
        assert!(matches!(err, VideoError::Generation(ref m) if m.contains("script")));
    }

    #[test]
    fn truncated_json_is_generation_failure() {
        let reply = "```json\n{\"script\": \"Wake up early.\", \"scenes\": [\"Sunrise\"";
        assert!(matches!(parse_reply(reply, 10), Err(VideoError::Generation(_))));
    }

    #[test]
    fn braces_in_prose_do_not_block_section_parsing() {
        let reply = "Script: Use a {timer} for focus.\nScenes:\n1. A kitchen timer";
        let parsed = parse_reply(reply, 10).unwrap();
        assert_eq!(parsed.script_text, "Use a {timer} for focus.");
        assert_eq!(parsed.scenes, vec!["A kitchen timer"]);
    }

    #[test]
    fn parses_json_scene_objects() {
        let reply = r#"{"script": "Go.", "scenes": [{"description": "Runner at dawn"}]}"#;
        let parsed = parse_reply(reply, 10).unwrap();
        assert_eq!(parsed.scenes, vec!["Runner at dawn"]);
    }

    #[test]
    fn parses_sectioned_reply() {
        let reply = "Script: Start your day right with three habits.\n\nScenes:\n1. A sunrise over a city\n2. A glass of water\nnot a scene\n3. A notebook";
        let parsed = parse_reply(reply, 10).unwrap();
        assert_eq!(parsed.script_text, "Start your day right with three habits.");
        assert_eq!(
            parsed.scenes,
            vec!["A sunrise over a city", "A glass of water", "A notebook"]
        );
    }

    #[test]
    fn falls_back_to_sentence_pairs() {
        let reply = "Drink water. Move your body. Plan the day. Smile";
        let parsed = parse_reply(reply, 10).unwrap();
        assert_eq!(parsed.script_text, reply);
        assert_eq!(
            parsed.scenes,
            vec!["Drink water. Move your body.", "Plan the day. Smile."]
        );
    }

    #[test]
    fn empty_reply_is_generation_failure() {
        assert!(matches!(parse_reply("  \n", 10), Err(VideoError::Generation(_))));
    }

    #[test]
    fn json_without_scenes_is_generation_failure() {
        let reply = r#"{"script": "Hello there.", "scenes": []}"#;
        assert!(matches!(parse_reply(reply, 10), Err(VideoError::Generation(_))));
    }

    #[test]
    fn scene_count_is_capped() {
        let scenes: Vec<String> = (0..14).map(|i| format!("\"scene {}\"", i)).collect();
        let reply = format!("{{\"script\": \"text\", \"scenes\": [{}]}}", scenes.join(","));
        let parsed = parse_reply(&reply, 10).unwrap();
        assert_eq!(parsed.scenes.len(), 10);
        assert_eq!(parsed.scenes[9], "scene 9");
    }

    #[test]
    fn instruction_names_language() {
        assert!(system_instruction("French").contains("in French"));
        assert!(user_message("tips", 45).contains("45-second"));
    }
}
