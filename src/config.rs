use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Path to the movie catalog CSV
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// Path to the historical ratings CSV
    #[serde(default = "default_ratings_path")]
    pub ratings_path: String,

    /// Path to the frozen NeuMF model asset (JSON)
    #[serde(default = "default_model_path")]
    pub model_path: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_catalog_path() -> String {
    "data/movies.csv".to_string()
}

fn default_ratings_path() -> String {
    "data/train.csv".to_string()
}

fn default_model_path() -> String {
    "data/neumf.json".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }
}
