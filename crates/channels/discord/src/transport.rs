//! Discord reply transports
//!
//! Both transports post a processing notice first and then replace it with the
//! final reply, so a request leaves exactly one message behind.

use async_trait::async_trait;
use lensbot_search::{DisplayBlock, Reply, ReplyTransport, Tone, TransportReplyError};
use serenity::builder::{
    CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage, EditInteractionResponse,
    EditMessage,
};
use serenity::model::application::CommandInteraction;
use serenity::model::id::{ChannelId, MessageId};
use serenity::prelude::Context;

pub const RESULTS_COLOUR: u32 = 0x4285F4;
pub const WARNING_COLOUR: u32 = 0xF4B400;
/// Discord rejects messages with more than 10 embeds.
pub const MAX_EMBEDS: usize = 10;

pub fn embed(block: &DisplayBlock) -> CreateEmbed {
    let colour = match block.tone {
        Tone::Results => RESULTS_COLOUR,
        Tone::Warning => WARNING_COLOUR,
    };

    let mut builder = CreateEmbed::new().title(&block.title).color(colour);
    if let Some(url) = &block.url {
        builder = builder.url(url);
    }
    if let Some(image) = &block.image_url {
        builder = builder.image(image);
    }
    for field in &block.fields {
        builder = builder.field(&field.name, &field.value, false);
    }
    builder
}

/// Content line plus embeds for a reply. Text replies carry no embeds.
fn parts(reply: Reply) -> (String, Vec<CreateEmbed>) {
    match reply {
        Reply::Text(text) => (text, Vec::new()),
        Reply::Rendered(rendered) => {
            let embeds = rendered.blocks.iter().take(MAX_EMBEDS).map(embed).collect();
            (rendered.status, embeds)
        }
    }
}

fn reply_error(action: &str, e: serenity::Error) -> TransportReplyError {
    TransportReplyError(format!("Discord {} failed: {}", action, e))
}

/// Replies to a plain upload in its channel.
pub struct MessageTransport {
    ctx: Context,
    channel_id: ChannelId,
    source: MessageId,
    notice: Option<MessageId>,
}

impl MessageTransport {
    pub fn new(ctx: Context, channel_id: ChannelId, source: MessageId) -> Self {
        Self {
            ctx,
            channel_id,
            source,
            notice: None,
        }
    }
}

#[async_trait]
impl ReplyTransport for MessageTransport {
    async fn notify_processing(&mut self, text: &str) -> Result<(), TransportReplyError> {
        let message = CreateMessage::new()
            .content(text)
            .reference_message((self.channel_id, self.source));
        let sent = self
            .channel_id
            .send_message(&self.ctx, message)
            .await
            .map_err(|e| reply_error("notice", e))?;
        self.notice = Some(sent.id);
        Ok(())
    }

    async fn deliver(&mut self, reply: Reply) -> Result<(), TransportReplyError> {
        let (content, embeds) = parts(reply);
        match self.notice {
            Some(notice) => {
                let edit = EditMessage::new().content(content).embeds(embeds);
                self.channel_id
                    .edit_message(&self.ctx, notice, edit)
                    .await
                    .map_err(|e| reply_error("edit", e))?;
            }
            None => {
                let message = CreateMessage::new()
                    .content(content)
                    .embeds(embeds)
                    .reference_message((self.channel_id, self.source));
                self.channel_id
                    .send_message(&self.ctx, message)
                    .await
                    .map_err(|e| reply_error("send", e))?;
            }
        }
        Ok(())
    }
}

/// Replies to `/search`. The notice is a deferred response; the reply edits it.
pub struct InteractionTransport {
    ctx: Context,
    command: CommandInteraction,
    deferred: bool,
}

impl InteractionTransport {
    pub fn new(ctx: Context, command: CommandInteraction) -> Self {
        Self {
            ctx,
            command,
            deferred: false,
        }
    }
}

#[async_trait]
impl ReplyTransport for InteractionTransport {
    async fn notify_processing(&mut self, _text: &str) -> Result<(), TransportReplyError> {
        // Deferring shows Discord's own "thinking" state.
        self.command
            .defer(&self.ctx)
            .await
            .map_err(|e| reply_error("defer", e))?;
        self.deferred = true;
        Ok(())
    }

    async fn deliver(&mut self, reply: Reply) -> Result<(), TransportReplyError> {
        let ephemeral = matches!(reply, Reply::Text(_));
        let (content, embeds) = parts(reply);

        if self.deferred {
            let edit = EditInteractionResponse::new().content(content).embeds(embeds);
            self.command
                .edit_response(&self.ctx, edit)
                .await
                .map_err(|e| reply_error("response edit", e))?;
        } else {
            // Never deferred: the request stopped before processing (e.g. no image given).
            let message = CreateInteractionResponseMessage::new()
                .content(content)
                .embeds(embeds)
                .ephemeral(ephemeral);
            self.command
                .create_response(&self.ctx, CreateInteractionResponse::Message(message))
                .await
                .map_err(|e| reply_error("response", e))?;
        }
        Ok(())
    }
}
