use crate::error::ConfigError;
use crate::models::challenge::ChallengeCatalog;
use std::path::Path;
use tokio::fs;

/// 从 JSON 文件加载挑战目录
///
/// 文件缺失、格式错误或目录为空都是致命的配置错误
pub async fn load_catalog(path: &Path) -> Result<ChallengeCatalog, ConfigError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::FileReadFailed {
            path: path.display().to_string(),
            source,
        })?;

    let catalog =
        ChallengeCatalog::from_json_str(&content).map_err(|source| ConfigError::CatalogParseFailed {
            path: path.display().to_string(),
            source,
        })?;

    if catalog.is_empty() {
        return Err(ConfigError::EmptyCatalog {
            path: path.display().to_string(),
        });
    }

    tracing::info!("成功加载挑战目录: {} 天", catalog.len());

    Ok(catalog)
}
