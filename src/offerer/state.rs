use serde::{Deserialize, Serialize};
use strum_macros::{Display, IntoStaticStr};

use crate::trade::TradeState;

#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, IntoStaticStr,
)]
pub enum OffererState {
    OfferOpen,
    DepositInputsSent,
    DepositPublished,
    FiatStarted,
    PayoutReceived,
    Completed,
}

impl TradeState for OffererState {
    const ROLE: &'static str = "offerer";
    const LABEL: &'static str = "Offerer";

    fn initial() -> Self {
        OffererState::OfferOpen
    }

    fn completed() -> Self {
        OffererState::Completed
    }
}
