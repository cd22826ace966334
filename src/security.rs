use std::convert::TryInto;
use std::path::PathBuf;
use std::{env, fs};

const PASSWORD_SALT: &str = "password.salt";
const ACCESS_SECRET: &str = "token_access.secret";
const REFRESH_SECRET: &str = "token_refresh.secret";

pub type Salt = [u8; 16];
pub type Secret = [u8; 32];

/// HMAC secrets for the two JWT kinds. Access tokens are short-lived and sent
/// with every request; refresh tokens are long-lived, persisted per user and
/// rotated on use.
#[derive(Debug, Clone)]
pub struct TokenSecrets {
    pub access: Secret,
    pub refresh: Secret,
}

#[derive(Debug, Clone)]
pub struct Security {
    pub salt: Salt,
    pub secrets: TokenSecrets,
}

#[inline]
fn security_dir() -> PathBuf {
    PathBuf::from(env::var("SECURITY_DIR").unwrap_or("./security".to_string()))
}

fn load_or_generate(dir: &PathBuf, file: &str) -> Option<Secret> {
    let secret: Option<Secret> = fs::read(dir.join(file))
        .map(|s| s.try_into().ok())
        .ok()
        .flatten();

    match secret {
        Some(s) => Some(s),
        None => {
            tracing::info!("'{}' not found in '{}'.", file, dir.display());
            if cfg!(feature = "generate-security") {
                tracing::info!("Generating a new secret for '{}'.", file);
                let s: Secret = rand::random();
                fs::write(dir.join(file), s).expect("unable to write token secret");
                Some(s)
            } else {
                None
            }
        }
    }
}

impl Security {
    pub fn load() -> Security {
        let dir = security_dir();

        if cfg!(feature = "generate-security") {
            fs::create_dir_all(dir.clone())
                .expect("unable to create directory for storing security information");
        }

        tracing::info!("Loading password salt...");
        let mut salt: Option<Salt> = fs::read(dir.join(PASSWORD_SALT))
            .map(|s| s.try_into().ok())
            .ok()
            .flatten();

        match salt {
            None => {
                tracing::info!("Salt not found in '{}'.", dir.join(PASSWORD_SALT).display());
                if cfg!(feature = "generate-security") {
                    tracing::info!("Generating a new password salt.");
                    salt = Some(rand::random());

                    fs::write(dir.join(PASSWORD_SALT), salt.unwrap())
                        .expect("unable to write salt");
                }
            }
            Some(_) => tracing::info!("Salt found and loaded."),
        }

        tracing::info!("Loading JWT signing secrets...");
        let access = load_or_generate(&dir, ACCESS_SECRET);
        let refresh = load_or_generate(&dir, REFRESH_SECRET);

        let secrets = match (access, refresh) {
            (Some(access), Some(refresh)) => TokenSecrets { access, refresh },
            _ => panic!("Unable to load access and/or refresh token secret(s)."),
        };

        Security {
            salt: salt.expect("Unable to load password salt."),
            secrets,
        }
    }
}
