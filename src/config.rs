//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::directory::{Identity, Role, RoleDirectory, RoleMetadata};
use crate::ledger::Address;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub pinning: PinningConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Deployed custody contract address
    #[serde(default = "default_contract_address")]
    pub contract_address: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
    /// State file for the local ledger double
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Whether a wallet provider is present at all
    #[serde(default = "default_true")]
    pub available: bool,
    /// Accounts the simulated provider exposes, first is the selected one
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PinningConfig {
    #[serde(default = "default_pinning_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_pinning_gateway")]
    pub gateway: String,
    /// Bearer token for the pinning service, never displayed
    #[serde(default)]
    pub jwt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_identities")]
    pub identities: Vec<IdentityConfig>,
}

/// One directory entry as configured; validated into an [`Identity`].
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    pub id: u32,
    pub name: String,
    pub role: String,
    pub wallet_address: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
}

impl IdentityConfig {
    fn build(&self) -> Result<Identity> {
        let role: Role = self
            .role
            .parse()
            .with_context(|| format!("Identity {}: bad role", self.id))?;
        let wallet_address = Address::parse(&self.wallet_address)
            .with_context(|| format!("Identity {}: bad wallet address", self.id))?;
        Ok(Identity {
            id: self.id,
            display_name: self.name.clone(),
            role,
            wallet_address,
            metadata: RoleMetadata {
                location: self.location.clone(),
                device_id: self.device_id.clone(),
                branch: self.branch.clone(),
                license: self.license.clone(),
            },
        })
    }
}

impl DirectoryConfig {
    /// Build the validated role directory from configuration.
    pub fn build(&self) -> Result<RoleDirectory> {
        let identities = self
            .identities
            .iter()
            .map(IdentityConfig::build)
            .collect::<Result<Vec<_>>>()?;
        RoleDirectory::new(identities).context("Invalid role directory")
    }
}

impl ProviderConfig {
    /// Parse the configured provider accounts.
    pub fn parsed_accounts(&self) -> Result<Vec<Address>> {
        self.accounts
            .iter()
            .map(|a| Address::parse(a).with_context(|| format!("Bad provider account: {a}")))
            .collect()
    }
}

// Default value functions
fn default_contract_address() -> String {
    std::env::var("CUYTRACE_CONTRACT_ADDRESS")
        .unwrap_or_else(|_| "0x0000000000000000000000000000000000000000".into())
}

fn default_chain_id() -> String {
    "0x539".into()
}

fn default_state_file() -> String {
    "cuytrace-ledger.json".into()
}

fn default_pinning_endpoint() -> String {
    "https://api.pinata.cloud/pinning/pinFileToIPFS".into()
}

fn default_pinning_gateway() -> String {
    "https://gateway.pinata.cloud".into()
}

fn default_true() -> bool {
    true
}

fn placeholder_wallet(n: u8) -> String {
    format!("0x{:040x}", n)
}

/// The original pilot directory: five fixed actors, wallet addresses
/// supplied by deployment configuration.
fn default_identities() -> Vec<IdentityConfig> {
    let entry = |id: u32, name: &str, role: &str| IdentityConfig {
        id,
        name: name.to_string(),
        role: role.to_string(),
        wallet_address: placeholder_wallet(id as u8),
        location: None,
        device_id: None,
        branch: None,
        license: None,
    };
    let mut identities = vec![
        entry(1, "Granja El Valle", "PRODUCER"),
        entry(2, "Centro Acopio Andino", "PROCESSOR"),
        entry(3, "Transportes Rápidos", "LOGISTICS"),
        entry(4, "Supermercados Wong", "RETAIL"),
        entry(5, "Inspector SENASA", "AUDITOR"),
    ];
    identities[0].location = Some("Cajamarca".into());
    identities[1].location = Some("Huancayo".into());
    identities[2].device_id = Some("IOT-99".into());
    identities[3].branch = Some("Lima".into());
    identities[4].license = Some("GOV-PE".into());
    identities
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            contract_address: default_contract_address(),
            chain_id: default_chain_id(),
            state_file: default_state_file(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            available: true,
            accounts: vec![placeholder_wallet(1)],
            chain_id: default_chain_id(),
        }
    }
}

impl Default for PinningConfig {
    fn default() -> Self {
        Self {
            endpoint: default_pinning_endpoint(),
            gateway: default_pinning_gateway(),
            jwt: String::new(),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            identities: default_identities(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            provider: ProviderConfig::default(),
            pinning: PinningConfig::default(),
            directory: DirectoryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix CUYTRACE_)
            .add_source(
                config::Environment::with_prefix("CUYTRACE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        Address::parse(&self.ledger.contract_address)
            .context("Invalid ledger contract address")?;

        self.provider.parsed_accounts()?;

        // directory construction runs the duplicate checks
        self.directory.build()?;

        if self.ledger.state_file.trim().is_empty() {
            anyhow::bail!("ledger state_file must not be empty");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Ledger:
    contract: {}
    chain_id: {}
    state_file: {}
  Provider:
    available: {}
    accounts: {}
    chain_id: {}
  Pinning:
    endpoint: {}
    gateway: {}
    jwt: {}
  Directory:
    identities: {}
"#,
            self.ledger.contract_address,
            self.ledger.chain_id,
            self.ledger.state_file,
            self.provider.available,
            self.provider.accounts.len(),
            self.provider.chain_id,
            self.pinning.endpoint,
            self.pinning.gateway,
            if self.pinning.jwt.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            self.directory.identities.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.directory.identities.len(), 5);
        assert_eq!(config.provider.chain_id, "0x539");
    }

    #[test]
    fn test_default_directory_builds_all_roles() {
        let directory = Config::default().directory.build().unwrap();
        assert_eq!(directory.identities().len(), 5);
        assert_eq!(
            directory.by_role(Role::Producer).unwrap().display_name,
            "Granja El Valle"
        );
        assert_eq!(
            directory
                .by_role(Role::Auditor)
                .unwrap()
                .metadata
                .license
                .as_deref(),
            Some("GOV-PE")
        );
    }

    #[test]
    fn test_bad_contract_address_rejected() {
        let mut config = Config::default();
        config.ledger.contract_address = "not-an-address".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_jwt_is_masked() {
        let mut config = Config::default();
        config.pinning.jwt = "very-secret-token".into();
        let display = config.masked_display();
        assert!(!display.contains("very-secret-token"));
        assert!(display.contains("***"));
    }
}
