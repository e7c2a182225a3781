use serde::{Deserialize, Serialize};
use strum_macros::{Display, IntoStaticStr};

use crate::trade::TradeState;

#[derive(
    Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, IntoStaticStr,
)]
pub enum TakerState {
    Created,
    FeePublished,
    DepositRequested,
    DepositPublished,
    FiatStarted,
    FiatReceived,
    PayoutSent,
    Completed,
}

impl TradeState for TakerState {
    const ROLE: &'static str = "taker";
    const LABEL: &'static str = "Taker";

    fn initial() -> Self {
        TakerState::Created
    }

    fn completed() -> Self {
        TakerState::Completed
    }
}
