//! Ticket enrichment for the demo server.

use async_trait::async_trait;
use codegrant_auth::{CreatingTicketContext, OAuthEvents};

/// Maps claims from the user information endpoint, or from the token
/// response when no such endpoint is configured.
///
/// A failing user information request rejects the sign-in.
#[derive(Debug, Default)]
pub struct ClaimMappingEvents;

#[async_trait]
impl OAuthEvents for ClaimMappingEvents {
    async fn creating_ticket(&self, context: &mut CreatingTicketContext<'_>) {
        if context.config().user_information_endpoint.is_none() {
            let response = context.token_response().response.clone();
            context.run_claim_actions(&response);
            return;
        }

        match context.fetch_user_info().await {
            Ok(user) => context.run_claim_actions(&user),
            Err(e) => {
                tracing::warn!(
                    scheme = %context.scheme(),
                    error = %e,
                    "Failed to load user information"
                );
                context.reject();
            }
        }
    }
}
