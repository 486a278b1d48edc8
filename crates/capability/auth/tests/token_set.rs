use mma_auth::{AuthError, TokenSet};

#[test]
fn disabled_token_set_allows_everything() {
    let tokens = TokenSet::disabled();
    assert!(tokens.verify(None).is_ok());
    assert!(tokens.verify(Some("anything")).is_ok());
}

#[test]
fn enabled_token_set_checks_membership() {
    let tokens = TokenSet::new(true, ["ingest-token", "ops-token"]);
    assert_eq!(tokens.len(), 2);
    assert!(tokens.verify(Some("ops-token")).is_ok());
    assert!(tokens.verify(Some(" ingest-token ")).is_ok());
    assert_eq!(tokens.verify(Some("ops")), Err(AuthError::TokenInvalid));
    assert_eq!(tokens.verify(None), Err(AuthError::MissingToken));
    assert_eq!(tokens.verify(Some("   ")), Err(AuthError::MissingToken));
}

#[test]
fn blank_tokens_are_ignored() {
    let tokens = TokenSet::new(true, ["", "  ", "real"]);
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens.verify(Some("")), Err(AuthError::MissingToken));
}
