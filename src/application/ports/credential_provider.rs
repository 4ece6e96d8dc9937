use async_trait::async_trait;

/// 送信時に付与する Bearer トークン。更新はこのクレートの責務外。
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self) -> Option<String>;
}

pub struct StaticCredential(Option<String>);

impl StaticCredential {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|value| !value.trim().is_empty()))
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}
