//! Starter `deploy.yml` written by `k3s-deploy init`.

use std::path::Path;

use super::ConfigError;

/// Commented starter configuration. Parses and validates as-is.
pub const STARTER_CONFIG: &str = r#"service: my-app # chart name, namespace and release name
image:
  name: my-user/my-app
  registry:
    server: ghcr.io
    username: my-user
    password:
      - GITHUB_TOKEN # read from the environment; the first one set is used
server:
  ip: 192.168.1.100 # host that receives k3s
  user: root
  ssh_key: ~/.ssh/id_rsa
  password: # set this instead of ssh_key for password login

traffic:
  domain: example.com
  tls: true # issue a Let's Encrypt certificate
  redirect_www: true # serve www.<domain> and redirect it to <domain>
  email: my-email@example.com # ACME account contact
  port: 8080 # container port of the application
env:
  clear:
    DB_HOST: localhost
  secrets:
    - DB_PASSWORD
"#;

/// Write the starter configuration to `path`, refusing to overwrite.
pub fn write_starter(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists(path.to_path_buf()));
    }

    std::fs::write(path, STARTER_CONFIG)?;
    tracing::info!(path = %path.display(), "wrote starter configuration");
    Ok(())
}
