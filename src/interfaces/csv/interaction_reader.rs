use crate::domain::interaction::{ActionKind, Interaction, UserId, fields};
use crate::error::{Result, ShopError};
use serde::Deserialize;
use std::io::Read;

/// One scripted interaction: `user,action,product,quantity,alias`.
#[derive(Debug, Deserialize)]
struct InteractionRow {
    user: u64,
    action: String,
    #[serde(default)]
    product: Option<String>,
    #[serde(default)]
    quantity: Option<String>,
    #[serde(default)]
    alias: Option<String>,
}

impl TryFrom<InteractionRow> for Interaction {
    type Error = ShopError;

    fn try_from(row: InteractionRow) -> Result<Self> {
        let kind: ActionKind = row.action.parse().map_err(ShopError::Validation)?;
        let mut interaction = Interaction::new(UserId(row.user), kind);
        for (name, value) in [
            (fields::PRODUCT_CODE, row.product),
            (fields::QUANTITY, row.quantity),
            (fields::GROWID, row.alias),
        ] {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                interaction = interaction.with_field(name, value);
            }
        }
        Ok(interaction)
    }
}

/// Reads scripted interactions from a CSV source.
///
/// Whitespace is trimmed and trailing empty columns may be omitted.
pub struct InteractionReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> InteractionReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily yields one interaction per row.
    pub fn interactions(self) -> impl Iterator<Item = Result<Interaction>> {
        self.reader
            .into_deserialize::<InteractionRow>()
            .map(|row| row.map_err(ShopError::from).and_then(Interaction::try_from))
    }
}
