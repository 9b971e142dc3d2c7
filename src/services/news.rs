//! News feed

use crate::db::repositories::NewsRepository;
use crate::models::{News, NewsInput, Page};
use crate::services::markdown::render_markdown;
use crate::services::{clean_title, ServiceError, ServiceResult};
use std::sync::Arc;

pub const NEWS_PER_PAGE: i64 = 10;

const MAX_TITLE_CHARS: usize = 256;

pub struct NewsService {
    repo: Arc<dyn NewsRepository>,
}

impl NewsService {
    pub fn new(repo: Arc<dyn NewsRepository>) -> Self {
        Self { repo }
    }

    /// Newest first; pages start at 1
    pub async fn list(&self, page: i64) -> ServiceResult<Page<News>> {
        let page = page.max(1);
        let (items, total) = self.repo.list(page, NEWS_PER_PAGE).await?;
        Ok(Page::new(items, page, NEWS_PER_PAGE, total))
    }

    pub async fn get(&self, id: i64) -> ServiceResult<News> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("новость {}", id)))
    }

    pub async fn create(&self, input: NewsInput) -> ServiceResult<News> {
        let (title, content) = validate(&input)?;
        let news = self
            .repo
            .create(&title, &content, &render_markdown(&content))
            .await?;
        tracing::info!(news_id = news.id, "News published");
        Ok(news)
    }

    pub async fn update(&self, id: i64, input: NewsInput) -> ServiceResult<News> {
        let (title, content) = validate(&input)?;
        if !self
            .repo
            .update(id, &title, &content, &render_markdown(&content))
            .await?
        {
            return Err(ServiceError::not_found(format!("новость {}", id)));
        }
        self.get(id).await
    }

    pub async fn delete(&self, id: i64) -> ServiceResult<()> {
        if !self.repo.delete(id).await? {
            return Err(ServiceError::not_found(format!("новость {}", id)));
        }
        Ok(())
    }
}

fn validate(input: &NewsInput) -> ServiceResult<(String, String)> {
    let title = clean_title(&input.title, MAX_TITLE_CHARS)?;
    let content = input.content.trim();
    if content.is_empty() {
        return Err(ServiceError::validation("Текст новости не может быть пустым"));
    }
    Ok((title, content.to_string()))
}
