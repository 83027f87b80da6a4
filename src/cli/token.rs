use anyhow::{bail, Result};
use clap::Args;
use route_gate::{HmacBearerPlugin, TokenClaims};
use serde_json::Value;

use crate::config::WardenConfig;

/// Developer helper for minting tokens the `bearer` verifier accepts.
#[derive(Args, Clone, Debug)]
pub struct MintTokenArgs {
    /// Subject (identity) of the token
    #[arg(long)]
    pub sub: String,

    /// Role granted to the subject (repeat for multiple roles)
    #[arg(long = "role", value_name = "ROLE")]
    pub roles: Vec<String>,

    /// Token lifetime, e.g. `15m` or `1h`
    #[arg(long)]
    pub ttl: Option<humantime::Duration>,

    /// Extra claim as KEY=VALUE; VALUE is parsed as JSON when possible
    #[arg(long = "claim", value_name = "KEY=VALUE")]
    pub claims: Vec<String>,
}

pub fn mint_token(args: &MintTokenArgs, config: &WardenConfig) -> Result<String> {
    let secret = config.auth.resolve_secret()?;
    let mut claims = args
        .roles
        .iter()
        .fold(TokenClaims::new(args.sub.clone()), |claims, role| {
            claims.with_role(role.clone())
        });
    for raw in &args.claims {
        let Some((key, value)) = raw.split_once('=') else {
            bail!("invalid claim '{raw}', expected KEY=VALUE");
        };
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.into()));
        claims = claims.with_claim(key.trim(), value);
    }
    if let Some(ttl) = args.ttl {
        claims = claims.expires_in(ttl.into());
    }
    Ok(HmacBearerPlugin::new(secret).mint(&claims)?)
}

pub fn cmd_mint_token(args: MintTokenArgs, config: &WardenConfig) -> Result<()> {
    println!("{}", mint_token(&args, config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use route_gate::AuthPlugin;

    fn config() -> WardenConfig {
        let mut config = WardenConfig::default();
        config.auth.secret = Some("mint-secret".into());
        config
    }

    #[tokio::test]
    async fn minted_token_carries_roles_and_claims() {
        let args = MintTokenArgs {
            sub: "u-1".into(),
            roles: vec!["user".into(), "admin".into()],
            ttl: Some("1h".parse().unwrap()),
            claims: vec!["profile_id=42".into(), "team=blue".into()],
        };
        let token = mint_token(&args, &config()).unwrap();
        let decoded = HmacBearerPlugin::new("mint-secret")
            .verify(&token)
            .await
            .unwrap();
        assert_eq!(decoded.subject, "u-1");
        assert_eq!(decoded.roles, vec!["user".to_string(), "admin".to_string()]);
        assert_eq!(decoded.claims["profile_id"], 42);
        assert_eq!(decoded.claims["team"], "blue");
    }

    #[test]
    fn malformed_claim_is_rejected() {
        let args = MintTokenArgs {
            sub: "u-1".into(),
            roles: Vec::new(),
            ttl: None,
            claims: vec!["nope".into()],
        };
        assert!(mint_token(&args, &config()).is_err());
    }
}
