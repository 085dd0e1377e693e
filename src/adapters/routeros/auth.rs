//! RouterOS authentication: new plain login, legacy MD5 challenge-response.

use md5::{Digest, Md5};

use super::connection::RouterOsConnection;

impl RouterOsConnection {
    pub(super) async fn login(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let login_result = self
            .raw_command(vec![
                "/login".to_string(),
                format!("=name={username}"),
                format!("=password={password}"),
            ])
            .await;

        match login_result {
            Ok(sentences) => {
                for s in &sentences {
                    if let Some(msg) = s.get("message") {
                        if msg.contains("failure") || msg.contains("invalid") {
                            return Err(format!("Login failed: {msg}").into());
                        }
                    }
                }
                return Ok(());
            }
            Err(e) => {
                tracing::debug!("new login method failed, trying legacy: {e}");
            }
        }

        let sentences = self.raw_command(vec!["/login".to_string()]).await?;
        let mut challenge_hex = None;
        for s in sentences {
            if let Some(ret) = s.get("ret") {
                challenge_hex = Some(ret.clone());
            }
        }
        let challenge_hex = challenge_hex.ok_or("No challenge 'ret' received")?;
        let challenge = hex::decode(&challenge_hex)?;

        let mut data = Vec::with_capacity(1 + password.len() + challenge.len());
        data.push(0u8);
        data.extend_from_slice(password.as_bytes());
        data.extend_from_slice(&challenge);
        let digest = Md5::digest(&data);
        let mut response = String::from("00");
        response.push_str(&hex::encode(digest));

        let login_sentences = self
            .raw_command(vec![
                "/login".to_string(),
                format!("=name={username}"),
                format!("=response={response}"),
            ])
            .await?;
        for s in &login_sentences {
            if s.contains_key("message") {
                tracing::warn!("login message: {:?}", s.get("message"));
            }
        }
        Ok(())
    }
}
