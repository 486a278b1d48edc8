//! 认证能力：REST 静态 Bearer token 校验。

use subtle::{Choice, ConstantTimeEq};

/// 认证相关错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("token invalid")]
    TokenInvalid,
}

/// 配置下发的 token 集合。
#[derive(Debug, Clone, Default)]
pub struct TokenSet {
    enabled: bool,
    tokens: Vec<String>,
}

impl TokenSet {
    /// 创建 token 集合，空白 token 会被忽略。
    pub fn new<I, S>(enabled: bool, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens = tokens
            .into_iter()
            .map(Into::into)
            .filter(|token: &String| !token.trim().is_empty())
            .collect();
        Self { enabled, tokens }
    }

    /// 关闭鉴权（全部放行）。
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// 校验请求携带的 token；关闭鉴权时总是通过。
    pub fn verify(&self, token: Option<&str>) -> Result<(), AuthError> {
        if !self.enabled {
            return Ok(());
        }
        let token = token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        // 遍历全部 token，避免通过提前返回泄露匹配位置。
        let matched = self
            .tokens
            .iter()
            .fold(Choice::from(0), |acc, known| {
                acc | known.as_bytes().ct_eq(token.as_bytes())
            });
        if bool::from(matched) {
            Ok(())
        } else {
            Err(AuthError::TokenInvalid)
        }
    }
}
