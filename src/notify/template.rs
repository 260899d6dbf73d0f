use handlebars::{no_escape, Handlebars, RenderError, TemplateError as CompileError};
use serde::Serialize;
use thiserror::Error;

use crate::model::{
    db::{election::Election, voter::Voter},
    ein::Ein,
};

const BODY: &str = "body";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("message body does not compile: {0}")]
    Compile(#[from] CompileError),
    #[error("message body failed to render: {0}")]
    Render(#[from] RenderError),
}

/// Does `text` contain a `{{ ... }}` placeholder anywhere on one line?
pub fn has_placeholders(text: &str) -> bool {
    text.lines().any(|line| {
        line.find("{{")
            .map_or(false, |start| line[start + 2..].contains("}}"))
    })
}

/// A compiled Handlebars message body.
///
/// Output feeds the Markdown renderer, so nothing is HTML-escaped here.
pub struct BodyTemplate {
    registry: Handlebars<'static>,
}

impl BodyTemplate {
    pub fn compile(text: &str) -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(no_escape);
        registry.register_template_string(BODY, text)?;
        Ok(Self { registry })
    }

    pub fn render(&self, context: &TemplateContext<'_>) -> Result<String, TemplateError> {
        Ok(self.registry.render(BODY, context)?)
    }
}

/// Everything a message body can refer to for one recipient.
#[derive(Debug, Serialize)]
pub struct TemplateContext<'a> {
    #[serde(rename = "EIN")]
    pub ein_upper: &'a str,
    pub ein: &'a str,
    pub voter: VoterContext<'a>,
    pub election: &'a ElectionContext,
}

impl<'a> TemplateContext<'a> {
    pub fn new(ein: &'a Ein, voter: &'a Voter, election: &'a ElectionContext) -> Self {
        Self {
            ein_upper: ein.as_str(),
            ein: ein.as_str(),
            voter: VoterContext {
                first_name: &voter.first_name,
                last_name: &voter.last_name,
                email: &voter.email,
            },
            election,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterContext<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
}

/// Election fields exposed to templates, with human-readable dates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionContext {
    pub name: String,
    pub description: String,
    pub start_date: String,
    pub end_date: String,
}

impl From<&Election> for ElectionContext {
    fn from(election: &Election) -> Self {
        const DATE_FORMAT: &str = "%B %-d, %Y";
        Self {
            name: election.name.clone(),
            description: election.description.clone(),
            start_date: election.start_date.format(DATE_FORMAT).to_string(),
            end_date: election.end_date.format(DATE_FORMAT).to_string(),
        }
    }
}
