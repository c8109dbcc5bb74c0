use crate::error::{Result, TsqlError};
use crate::value::Value;
use serde::{Deserialize, Serialize};

pub const SERVER_VERSION: &str = "Microsoft SQL Server 2019 (tsql-runtime 0.1.0)";

/// Per-session settings, mirrored by `@@` variables and the `SET` statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub spid: i32,
    pub server_name: String,
    pub service_name: String,
    pub database: String,
    pub login_name: String,
    pub user_name: String,
    pub host_name: String,
    pub app_name: String,
    pub language: String,
    pub version: String,
    /// First day of the week, 1 = Monday .. 7 = Sunday.
    pub datefirst: u8,
    pub dateformat: String,
    pub nocount: bool,
    pub xact_abort: bool,
    pub ansi_nulls: bool,
    pub concat_null_yields_null: bool,
    pub lock_timeout: i32,
    pub textsize: i32,
    /// Seed for RAND(); when absent the generator is seeded from entropy.
    pub rand_seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            spid: 51,
            server_name: "localhost".into(),
            service_name: "MSSQLSERVER".into(),
            database: "master".into(),
            login_name: "sa".into(),
            user_name: "dbo".into(),
            host_name: "localhost".into(),
            app_name: "tsql-runtime".into(),
            language: "us_english".into(),
            version: SERVER_VERSION.into(),
            datefirst: 7,
            dateformat: "mdy".into(),
            nocount: false,
            xact_abort: false,
            ansi_nulls: true,
            concat_null_yields_null: true,
            lock_timeout: -1,
            textsize: 2_147_483_647,
            rand_seed: None,
        }
    }
}

fn on_off(value: &Value) -> Result<bool> {
    let text = value.as_string();
    match text.trim().to_ascii_uppercase().as_str() {
        "ON" | "1" | "TRUE" => Ok(true),
        "OFF" | "0" | "FALSE" => Ok(false),
        other => Err(TsqlError::Invalid(format!("expected ON or OFF, got '{other}'"))),
    }
}

impl SessionConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| TsqlError::Invalid(format!("invalid session config: {e}")))
    }

    /// Apply a `SET <option> <value>` statement.
    pub fn set_option(&mut self, name: &str, value: &Value) -> Result<()> {
        let name = name.trim().to_ascii_uppercase();
        match name.as_str() {
            "NOCOUNT" => self.nocount = on_off(value)?,
            "XACT_ABORT" => self.xact_abort = on_off(value)?,
            "ANSI_NULLS" => self.ansi_nulls = on_off(value)?,
            "CONCAT_NULL_YIELDS_NULL" => self.concat_null_yields_null = on_off(value)?,
            "DATEFIRST" => {
                let n = value.as_int();
                if !(1..=7).contains(&n) {
                    return Err(TsqlError::Invalid(format!(
                        "DATEFIRST must be between 1 and 7, got {n}"
                    )));
                }
                self.datefirst = n as u8;
            }
            "DATEFORMAT" => {
                let f = value.as_string().to_ascii_lowercase();
                if !matches!(f.as_str(), "mdy" | "dmy" | "ymd" | "ydm" | "myd" | "dym") {
                    return Err(TsqlError::Invalid(format!("invalid DATEFORMAT '{f}'")));
                }
                self.dateformat = f;
            }
            "LANGUAGE" => self.language = value.as_string(),
            "LOCK_TIMEOUT" => self.lock_timeout = value.as_int() as i32,
            "TEXTSIZE" => self.textsize = value.as_int() as i32,
            _ => {
                return Err(TsqlError::NotSupported(format!(
                    "SET option {name}"
                )))
            }
        }
        Ok(())
    }
}
