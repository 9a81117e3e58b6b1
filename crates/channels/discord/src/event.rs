//! Serenity models → platform-neutral inbound events

use lensbot_search::{Attachment, InboundEvent};
use serenity::builder::{CreateCommand, CreateCommandOption};
use serenity::model::application::{CommandInteraction, CommandOptionType, ResolvedValue};
use serenity::model::channel::{Attachment as DiscordAttachment, Message};

pub const SEARCH_COMMAND: &str = "search";
pub const IMAGE_OPTION: &str = "image";
pub const URL_OPTION: &str = "url";

/// `/search [image] [url]`. Both options are optional; a missing image gets a prompt.
pub fn search_command() -> CreateCommand {
    CreateCommand::new(SEARCH_COMMAND)
        .description("Reverse image search an attachment or an image URL")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Attachment, IMAGE_OPTION, "Image to search for")
                .required(false),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, URL_OPTION, "Public image URL").required(false),
        )
}

fn attachment(a: &DiscordAttachment) -> Attachment {
    Attachment {
        filename: a.filename.clone(),
        content_type: a.content_type.clone(),
        url: Some(a.url.clone()),
        data: None,
    }
}

pub fn from_message(msg: &Message) -> InboundEvent {
    InboundEvent {
        request_id: format!("dc-msg-{}", msg.id),
        attachments: msg.attachments.iter().map(attachment).collect(),
        argument: None,
    }
}

pub fn from_command(command: &CommandInteraction) -> InboundEvent {
    let mut event = InboundEvent {
        request_id: format!("dc-cmd-{}", command.id),
        ..InboundEvent::default()
    };

    for option in command.data.options() {
        match (option.name, option.value) {
            (IMAGE_OPTION, ResolvedValue::Attachment(a)) => event.attachments.push(attachment(a)),
            (URL_OPTION, ResolvedValue::String(s)) => event.argument = Some(s.to_string()),
            _ => {}
        }
    }

    event
}

/// Plain uploads are only answered when enabled and when at least one attachment is an image.
pub fn wants_upload_reply(react_to_uploads: bool, from_bot: bool, event: &InboundEvent) -> bool {
    react_to_uploads && !from_bot && event.attachments.iter().any(Attachment::is_image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn upload(content_type: Option<&str>) -> InboundEvent {
        InboundEvent {
            request_id: "dc-msg-1".into(),
            attachments: vec![Attachment {
                filename: "file".into(),
                content_type: content_type.map(str::to_string),
                url: Some("https://cdn.discordapp.com/attachments/1/2/file".into()),
                data: None,
            }],
            argument: None,
        }
    }

    #[test]
    fn uploads_need_an_image_and_a_human() {
        assert!(wants_upload_reply(true, false, &upload(Some("image/png"))));
        assert!(!wants_upload_reply(true, true, &upload(Some("image/png"))));
        assert!(!wants_upload_reply(false, false, &upload(Some("image/png"))));
        assert!(!wants_upload_reply(true, false, &upload(Some("application/pdf"))));
        assert!(!wants_upload_reply(true, false, &upload(None)));
        assert!(!wants_upload_reply(true, false, &InboundEvent::default()));
    }

    #[test]
    fn search_command_declares_optional_image_and_url() {
        let json = serde_json::to_value(search_command()).unwrap();
        assert_eq!(json["name"], "search");

        let options = json["options"].as_array().unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0]["name"], IMAGE_OPTION);
        assert_eq!(options[0]["type"], 11);
        assert_eq!(options[1]["name"], URL_OPTION);
        assert_eq!(options[1]["type"], 3);
        assert!(options.iter().all(|o| o["required"] != true));
    }
}
