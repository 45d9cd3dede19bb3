//! Birthday message templates.
//!
//! Supported syntax:
//! - `{name}`, `{cohort}`, `{age}`, `{year}` placeholders
//! - `{#age}...{/age}` sections, rendered only when age is included
//!
//! With age disabled, a bare `{age}` renders as nothing. Anything else in braces is
//! rejected at parse time so a broken template never reaches the transport.

use crate::errors::{Error, Result};

/// Values substituted into a template.
#[derive(Debug, Clone, Copy)]
pub struct MessageContext<'a> {
    /// Person's display name
    pub name: &'a str,
    /// Graduation cohort, if known
    pub cohort: Option<&'a str>,
    /// Age turned on the occurrence
    pub age: i32,
    /// Occurrence year
    pub year: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
    Name,
    Cohort,
    Age,
    Year,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Value(Placeholder),
    AgeSection(Vec<Segment>),
}

/// A parsed, validated message template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    segments: Vec<Segment>,
}

impl MessageTemplate {
    /// Parses `source`, rejecting empty or malformed templates.
    pub fn parse(source: &str) -> Result<Self> {
        if source.trim().is_empty() {
            return Err(template_error("template is empty"));
        }

        let mut segments = Vec::new();
        let mut section: Option<Vec<Segment>> = None;
        let mut rest = source;

        while !rest.is_empty() {
            let Some(open) = rest.find(['{', '}']) else {
                push_text(current(&mut segments, &mut section), rest);
                break;
            };

            push_text(current(&mut segments, &mut section), &rest[..open]);
            if rest[open..].starts_with('}') {
                return Err(template_error("unmatched '}'"));
            }

            let after_open = &rest[open + 1..];
            let close = after_open
                .find('}')
                .ok_or_else(|| template_error("unclosed '{'"))?;
            let tag = after_open[..close].trim();
            rest = &after_open[close + 1..];

            match tag {
                "#age" => {
                    if section.is_some() {
                        return Err(template_error("age sections cannot be nested"));
                    }
                    section = Some(Vec::new());
                }
                "/age" => {
                    let inner = section
                        .take()
                        .ok_or_else(|| template_error("'{/age}' without '{#age}'"))?;
                    segments.push(Segment::AgeSection(inner));
                }
                other => {
                    let placeholder = match other {
                        "name" => Placeholder::Name,
                        "cohort" => Placeholder::Cohort,
                        "age" => Placeholder::Age,
                        "year" => Placeholder::Year,
                        unknown => {
                            return Err(template_error(&format!(
                                "unknown placeholder '{{{unknown}}}'"
                            )));
                        }
                    };
                    current(&mut segments, &mut section).push(Segment::Value(placeholder));
                }
            }
        }

        if section.is_some() {
            return Err(template_error("'{#age}' is never closed"));
        }

        Ok(Self { segments })
    }

    /// Renders the template; age appears only when `include_age` is set.
    #[must_use]
    pub fn render(&self, context: &MessageContext<'_>, include_age: bool) -> String {
        let mut out = String::new();
        render_segments(&self.segments, context, include_age, &mut out);
        out.trim().to_string()
    }
}

fn render_segments(
    segments: &[Segment],
    context: &MessageContext<'_>,
    include_age: bool,
    out: &mut String,
) {
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Value(Placeholder::Name) => out.push_str(context.name),
            Segment::Value(Placeholder::Cohort) => out.push_str(context.cohort.unwrap_or("")),
            Segment::Value(Placeholder::Age) => {
                if include_age {
                    out.push_str(&context.age.to_string());
                }
            }
            Segment::Value(Placeholder::Year) => out.push_str(&context.year.to_string()),
            Segment::AgeSection(inner) => {
                if include_age {
                    render_segments(inner, context, include_age, out);
                }
            }
        }
    }
}

fn current<'a>(
    segments: &'a mut Vec<Segment>,
    section: &'a mut Option<Vec<Segment>>,
) -> &'a mut Vec<Segment> {
    match section {
        Some(inner) => inner,
        None => segments,
    }
}

fn push_text(target: &mut Vec<Segment>, text: &str) {
    if !text.is_empty() {
        target.push(Segment::Text(text.to_string()));
    }
}

fn template_error(message: &str) -> Error {
    Error::Template {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    const CONTEXT: MessageContext<'static> = MessageContext {
        name: "Rina",
        cohort: Some("2012"),
        age: 35,
        year: 2025,
    };

    fn render(template: &str, context: &MessageContext<'_>, include_age: bool) -> String {
        MessageTemplate::parse(template).unwrap().render(context, include_age)
    }

    #[test]
    fn test_render_all_placeholders() {
        let rendered = render(
            "Happy birthday {name} (class of {cohort}), {age} in {year}!",
            &CONTEXT,
            true,
        );
        assert_eq!(rendered, "Happy birthday Rina (class of 2012), 35 in 2025!");
    }

    #[test]
    fn test_age_section_dropped_without_include_age() {
        let template = "Happy birthday, {name}!{#age} Congratulations on turning {age}.{/age}";
        assert_eq!(
            render(template, &CONTEXT, true),
            "Happy birthday, Rina! Congratulations on turning 35."
        );
        assert_eq!(render(template, &CONTEXT, false), "Happy birthday, Rina!");
    }

    #[test]
    fn test_bare_age_renders_empty_without_include_age() {
        assert_eq!(render("{name} {age}", &CONTEXT, false), "Rina");
    }

    #[test]
    fn test_malformed_templates_rejected() {
        for bad in [
            "",
            "   ",
            "Hello {name",
            "Hello name}",
            "Hello {nickname}",
            "{#age}open",
            "close{/age}",
            "{#age}{#age}{/age}{/age}",
        ] {
            assert!(
                matches!(MessageTemplate::parse(bad), Err(Error::Template { .. })),
                "expected '{bad}' to be rejected"
            );
        }
    }

    #[test]
    fn test_missing_cohort_renders_empty() {
        let context = MessageContext {
            cohort: None,
            ..CONTEXT
        };
        assert_eq!(render("{name}{cohort}!", &context, true), "Rina!");
    }
}
