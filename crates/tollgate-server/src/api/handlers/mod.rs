//! API request handlers

pub mod issue;
pub mod issuers;
pub mod lookup;
pub mod redeem;

pub use issue::{issue_tokens, AppState, BlindedTokenIssueRequest, BlindedTokenIssueResponse};
pub use issuers::{create_issuer, get_issuer, CreateIssuerRequest, IssuerResponse};
pub use lookup::{check_redemption, RedemptionQuery};
pub use redeem::{redeem_token, BlindedTokenRedeemRequest};
