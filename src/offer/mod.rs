mod builder;
mod offer;

pub use builder::OfferBuilder;
pub use offer::Offer;
