use serde::Serialize;

pub const COFFEE_ORDER_CALLBACK_ID: &str = "coffee_order_modal";
pub const DRINK_TYPE_BLOCK_ID: &str = "drink_type_block";
pub const SIZE_BLOCK_ID: &str = "size_block";
pub const CUSTOMIZATIONS_BLOCK_ID: &str = "customizations_block";

pub const DRINK_TYPES: [(&str, &str); 5] = [
    ("Espresso", "espresso"),
    ("Latte", "latte"),
    ("Cappuccino", "cappuccino"),
    ("Americano", "americano"),
    ("Mocha", "mocha"),
];

pub const DRINK_SIZES: [(&str, &str); 3] =
    [("Small", "small"), ("Medium", "medium"), ("Large", "large")];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    PlainText { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::PlainText { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OptionObject {
    pub text: TextObject,
    pub value: String,
}

impl OptionObject {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self { text: TextObject::plain(label), value: value.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputElement {
    StaticSelect {
        action_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<TextObject>,
        options: Vec<OptionObject>,
    },
    RadioButtons {
        action_id: String,
        options: Vec<OptionObject>,
    },
    PlainTextInput {
        action_id: String,
        multiline: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<TextObject>,
    },
}

impl InputElement {
    pub fn action_id(&self) -> &str {
        match self {
            Self::StaticSelect { action_id, .. }
            | Self::RadioButtons { action_id, .. }
            | Self::PlainTextInput { action_id, .. } => action_id,
        }
    }

    pub fn options(&self) -> &[OptionObject] {
        match self {
            Self::StaticSelect { options, .. } | Self::RadioButtons { options, .. } => options,
            Self::PlainTextInput { .. } => &[],
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Input {
        block_id: String,
        element: InputElement,
        label: TextObject,
        #[serde(skip_serializing_if = "is_false")]
        optional: bool,
    },
}

impl Block {
    pub fn block_id(&self) -> &str {
        match self {
            Self::Input { block_id, .. } => block_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum View {
    Modal {
        callback_id: String,
        title: TextObject,
        submit: TextObject,
        close: TextObject,
        blocks: Vec<Block>,
    },
}

impl View {
    pub fn blocks(&self) -> &[Block] {
        match self {
            Self::Modal { blocks, .. } => blocks,
        }
    }
}

/// Body for Slack's `views.open`, returned directly as the command response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ViewOpenPayload {
    pub trigger_id: Option<String>,
    pub view: View,
}

pub struct ModalBuilder {
    callback_id: String,
    title: String,
    submit: String,
    close: String,
    blocks: Vec<Block>,
}

impl ModalBuilder {
    pub fn new(callback_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            callback_id: callback_id.into(),
            title: title.into(),
            submit: "Submit".to_owned(),
            close: "Cancel".to_owned(),
            blocks: Vec::new(),
        }
    }

    pub fn submit(mut self, label: impl Into<String>) -> Self {
        self.submit = label.into();
        self
    }

    pub fn close(mut self, label: impl Into<String>) -> Self {
        self.close = label.into();
        self
    }

    pub fn input<F>(mut self, block_id: impl Into<String>, label: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut InputBuilder),
    {
        let mut builder = InputBuilder::default();
        build(&mut builder);
        let (element, optional) = builder.build();
        self.blocks.push(Block::Input {
            block_id: block_id.into(),
            element,
            label: TextObject::plain(label),
            optional,
        });
        self
    }

    pub fn build(self) -> View {
        View::Modal {
            callback_id: self.callback_id,
            title: TextObject::plain(self.title),
            submit: TextObject::plain(self.submit),
            close: TextObject::plain(self.close),
            blocks: self.blocks,
        }
    }
}

#[derive(Default)]
pub struct InputBuilder {
    element: Option<InputElement>,
    optional: bool,
}

impl InputBuilder {
    pub fn static_select(
        &mut self,
        action_id: impl Into<String>,
        placeholder: impl Into<String>,
        options: &[(&str, &str)],
    ) -> &mut Self {
        self.element = Some(InputElement::StaticSelect {
            action_id: action_id.into(),
            placeholder: Some(TextObject::plain(placeholder)),
            options: build_options(options),
        });
        self
    }

    pub fn radio_buttons(
        &mut self,
        action_id: impl Into<String>,
        options: &[(&str, &str)],
    ) -> &mut Self {
        self.element = Some(InputElement::RadioButtons {
            action_id: action_id.into(),
            options: build_options(options),
        });
        self
    }

    pub fn plain_text(
        &mut self,
        action_id: impl Into<String>,
        placeholder: impl Into<String>,
        multiline: bool,
    ) -> &mut Self {
        self.element = Some(InputElement::PlainTextInput {
            action_id: action_id.into(),
            multiline,
            placeholder: Some(TextObject::plain(placeholder)),
        });
        self
    }

    pub fn optional(&mut self) -> &mut Self {
        self.optional = true;
        self
    }

    fn build(self) -> (InputElement, bool) {
        let element = self.element.unwrap_or_else(|| InputElement::PlainTextInput {
            action_id: String::new(),
            multiline: false,
            placeholder: None,
        });
        (element, self.optional)
    }
}

fn build_options(options: &[(&str, &str)]) -> Vec<OptionObject> {
    options.iter().map(|(label, value)| OptionObject::new(*label, *value)).collect()
}

pub fn coffee_order_modal(trigger_id: Option<String>) -> ViewOpenPayload {
    let view = ModalBuilder::new(COFFEE_ORDER_CALLBACK_ID, "Coffee Order")
        .submit("Submit")
        .close("Cancel")
        .input(DRINK_TYPE_BLOCK_ID, "Drink Type", |input| {
            input.static_select("drink_type", "Select drink type", &DRINK_TYPES);
        })
        .input(SIZE_BLOCK_ID, "Size", |input| {
            input.radio_buttons("size", &DRINK_SIZES);
        })
        .input(CUSTOMIZATIONS_BLOCK_ID, "Customizations", |input| {
            input.plain_text("customizations", "e.g., extra shot, oat milk, no sugar", true).optional();
        })
        .build();

    ViewOpenPayload { trigger_id, view }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        coffee_order_modal, Block, InputElement, ModalBuilder, View, CUSTOMIZATIONS_BLOCK_ID,
        DRINK_TYPE_BLOCK_ID, SIZE_BLOCK_ID,
    };

    #[test]
    fn modal_builder_creates_typed_input_blocks() {
        let view = ModalBuilder::new("test_modal", "Test")
            .input("first_block", "First", |input| {
                input.radio_buttons("first", &[("One", "one")]);
            })
            .input("second_block", "Second", |input| {
                input.plain_text("second", "type here", false).optional();
            })
            .build();

        assert_eq!(view.blocks().len(), 2);
        assert!(matches!(
            &view.blocks()[0],
            Block::Input { block_id, element: InputElement::RadioButtons { .. }, optional: false, .. }
                if block_id == "first_block"
        ));
        assert!(matches!(
            &view.blocks()[1],
            Block::Input { element: InputElement::PlainTextInput { multiline: false, .. }, optional: true, .. }
        ));
    }

    #[test]
    fn coffee_modal_echoes_trigger_and_has_three_blocks_in_order() {
        let payload = coffee_order_modal(Some("12345.67890".to_owned()));

        assert_eq!(payload.trigger_id.as_deref(), Some("12345.67890"));
        let ids = payload.view.blocks().iter().map(Block::block_id).collect::<Vec<_>>();
        assert_eq!(ids, [DRINK_TYPE_BLOCK_ID, SIZE_BLOCK_ID, CUSTOMIZATIONS_BLOCK_ID]);
    }

    #[test]
    fn coffee_modal_offers_five_drinks_and_three_sizes() {
        let payload = coffee_order_modal(None);
        let blocks = payload.view.blocks();

        let drink_element = if let Block::Input { element, .. } = &blocks[0] {
            Some(element)
        } else {
            None
        };
        let drink_element = drink_element.expect("drink block is an input");
        assert!(matches!(drink_element, InputElement::StaticSelect { .. }));
        let drinks =
            drink_element.options().iter().map(|option| option.value.as_str()).collect::<Vec<_>>();
        assert_eq!(drinks, ["espresso", "latte", "cappuccino", "americano", "mocha"]);

        let Block::Input { element: size_element, .. } = &blocks[1];
        assert!(matches!(size_element, InputElement::RadioButtons { .. }));
        assert_eq!(size_element.options().len(), 3);
        assert_eq!(size_element.action_id(), "size");
    }

    #[test]
    fn customizations_are_optional_multiline_text() {
        let payload = coffee_order_modal(None);

        assert!(matches!(
            &payload.view.blocks()[2],
            Block::Input {
                element: InputElement::PlainTextInput { multiline: true, placeholder: Some(placeholder), .. },
                optional: true,
                ..
            } if placeholder.text() == "e.g., extra shot, oat milk, no sugar"
        ));
    }

    #[test]
    fn coffee_modal_serializes_to_slack_view_shape() {
        let value = serde_json::to_value(coffee_order_modal(Some("T1".to_owned())))
            .expect("serializable");

        assert_eq!(value["trigger_id"], json!("T1"));
        assert_eq!(value["view"]["type"], json!("modal"));
        assert_eq!(value["view"]["callback_id"], json!("coffee_order_modal"));
        assert_eq!(value["view"]["title"], json!({"type": "plain_text", "text": "Coffee Order"}));
        assert_eq!(value["view"]["submit"], json!({"type": "plain_text", "text": "Submit"}));
        assert_eq!(value["view"]["close"], json!({"type": "plain_text", "text": "Cancel"}));
        assert_eq!(
            value["view"]["blocks"][0]["element"]["options"][0],
            json!({"text": {"type": "plain_text", "text": "Espresso"}, "value": "espresso"})
        );
        assert_eq!(value["view"]["blocks"][1]["element"]["type"], json!("radio_buttons"));
        assert!(value["view"]["blocks"][0].get("optional").is_none());
        assert_eq!(value["view"]["blocks"][2]["optional"], json!(true));
    }

    #[test]
    fn missing_trigger_id_serializes_as_null() {
        let value = serde_json::to_value(coffee_order_modal(None)).expect("serializable");

        assert!(value["trigger_id"].is_null());
        assert!(matches!(
            serde_json::from_value::<serde_json::Value>(value["view"].clone()),
            Ok(view) if view["blocks"].as_array().map(Vec::len) == Some(3)
        ));
    }

    #[test]
    fn view_is_a_modal() {
        assert!(matches!(coffee_order_modal(None).view, View::Modal { .. }));
    }
}
