use crate::application::pipeline::ActionOutcome;
use crate::application::render;
use crate::domain::message::Reply;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct ReplyRow<'a> {
    user: u64,
    action: &'a str,
    outcome: &'a str,
    title: &'a str,
    description: String,
}

impl<'a> From<&'a ActionOutcome> for ReplyRow<'a> {
    fn from(outcome: &'a ActionOutcome) -> Self {
        let description = match &outcome.reply {
            Reply::Embed(embed) => embed.description.clone().unwrap_or_default(),
            Reply::Modal(modal) => render::modal_body(modal),
        };
        Self {
            user: outcome.user.0,
            action: outcome.action.as_str(),
            outcome: outcome.status(),
            title: outcome.reply.title(),
            description,
        }
    }
}

/// Writes one CSV row per reply: `user,action,outcome,title,description`.
pub struct ReplyWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReplyWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write(&mut self, outcome: &ActionOutcome) -> Result<()> {
        self.writer.serialize(ReplyRow::from(outcome))?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
