//! Blog articles, tags and view counting

use crate::db::repositories::blog::ArticleFields;
use crate::db::repositories::BlogRepository;
use crate::models::{BlogArticle, BlogArticleInput, BlogArticleWithTags, BlogTag, BlogTagInput, Page};
use crate::services::markdown::render_markdown;
use crate::services::{clean_title, ServiceError, ServiceResult};
use chrono::{Duration, Utc};
use std::sync::Arc;

pub const ARTICLES_PER_PAGE: i64 = 10;

/// One view per IP address and article inside this window
const VIEW_WINDOW_HOURS: i64 = 24;

const MAX_TITLE_CHARS: usize = 256;
const MAX_TAG_CHARS: usize = 64;

/// URL slug for a tag title. Cyrillic is transliterated; anything that is
/// not a letter or digit becomes a single hyphen.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        match transliterate(c) {
            Some(latin) => slug.push_str(latin),
            None if c.is_ascii_alphanumeric() => slug.push(c),
            None => {
                if !slug.is_empty() && !slug.ends_with('-') {
                    slug.push('-');
                }
            }
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn transliterate(c: char) -> Option<&'static str> {
    let latin = match c {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' | 'ё' | 'э' => "e",
        'ж' => "zh",
        'з' => "z",
        'и' | 'й' => "i",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ы' => "y",
        'ю' => "yu",
        'я' => "ya",
        'ъ' | 'ь' => "",
        _ => return None,
    };
    Some(latin)
}

pub struct BlogService {
    repo: Arc<dyn BlogRepository>,
}

impl BlogService {
    pub fn new(repo: Arc<dyn BlogRepository>) -> Self {
        Self { repo }
    }

    /// Published articles (all articles for admins), newest first
    pub async fn list(
        &self,
        include_drafts: bool,
        tag_slug: Option<&str>,
        page: i64,
    ) -> ServiceResult<Page<BlogArticleWithTags>> {
        let page = page.max(1);
        let (articles, total) = self
            .repo
            .list_articles(include_drafts, tag_slug, page, ARTICLES_PER_PAGE)
            .await?;
        let ids: Vec<i64> = articles.iter().map(|a| a.id).collect();
        let mut tags = self.repo.tags_for_articles(&ids).await?;

        let items = articles
            .into_iter()
            .map(|article| BlogArticleWithTags {
                tags: tags.remove(&article.id).unwrap_or_default(),
                article,
            })
            .collect();
        Ok(Page::new(items, page, ARTICLES_PER_PAGE, total))
    }

    /// A single article; drafts are only visible with `include_drafts`
    pub async fn get(&self, id: i64, include_drafts: bool) -> ServiceResult<BlogArticleWithTags> {
        let article = self
            .repo
            .get_article(id)
            .await?
            .filter(|a| a.is_published || include_drafts)
            .ok_or_else(|| ServiceError::not_found(format!("статья {}", id)))?;
        let tags = self
            .repo
            .tags_for_articles(&[id])
            .await?
            .remove(&id)
            .unwrap_or_default();
        Ok(BlogArticleWithTags { article, tags })
    }

    /// Count a view unless this IP already viewed the article within 24 hours
    pub async fn record_view(&self, article_id: i64, user_id: Option<i64>, ip_address: &str) -> ServiceResult<bool> {
        let since = Utc::now() - Duration::hours(VIEW_WINDOW_HOURS);
        Ok(self
            .repo
            .record_view(article_id, user_id, ip_address, since)
            .await?)
    }

    pub async fn create_article(&self, input: BlogArticleInput) -> ServiceResult<BlogArticle> {
        let (title, content) = self.validate_article(&input).await?;
        let html = render_markdown(&content);
        let id = self
            .repo
            .create_article(&ArticleFields {
                title: &title,
                content: &content,
                content_html: &html,
                is_published: input.is_published,
                tag_ids: &input.tag_ids,
            })
            .await?;
        tracing::info!(article_id = id, published = input.is_published, "Blog article created");
        Ok(self.get(id, true).await?.article)
    }

    pub async fn update_article(&self, id: i64, input: BlogArticleInput) -> ServiceResult<BlogArticle> {
        let (title, content) = self.validate_article(&input).await?;
        let html = render_markdown(&content);
        let updated = self
            .repo
            .update_article(
                id,
                &ArticleFields {
                    title: &title,
                    content: &content,
                    content_html: &html,
                    is_published: input.is_published,
                    tag_ids: &input.tag_ids,
                },
            )
            .await?;
        if !updated {
            return Err(ServiceError::not_found(format!("статья {}", id)));
        }
        Ok(self.get(id, true).await?.article)
    }

    pub async fn delete_article(&self, id: i64) -> ServiceResult<()> {
        if !self.repo.delete_article(id).await? {
            return Err(ServiceError::not_found(format!("статья {}", id)));
        }
        Ok(())
    }

    pub async fn list_tags(&self) -> ServiceResult<Vec<BlogTag>> {
        Ok(self.repo.list_tags().await?)
    }

    pub async fn create_tag(&self, input: BlogTagInput) -> ServiceResult<BlogTag> {
        let (title, slug) = self.validate_tag(&input, None).await?;
        Ok(self.repo.create_tag(&title, &slug).await?)
    }

    pub async fn update_tag(&self, id: i64, input: BlogTagInput) -> ServiceResult<()> {
        let (title, slug) = self.validate_tag(&input, Some(id)).await?;
        if !self.repo.update_tag(id, &title, &slug).await? {
            return Err(ServiceError::not_found(format!("тег {}", id)));
        }
        Ok(())
    }

    pub async fn delete_tag(&self, id: i64) -> ServiceResult<()> {
        if !self.repo.delete_tag(id).await? {
            return Err(ServiceError::not_found(format!("тег {}", id)));
        }
        Ok(())
    }

    async fn validate_article(&self, input: &BlogArticleInput) -> ServiceResult<(String, String)> {
        let title = clean_title(&input.title, MAX_TITLE_CHARS)?;
        let content = input.content.trim();
        if content.is_empty() {
            return Err(ServiceError::validation("Текст статьи не может быть пустым"));
        }
        if !input.tag_ids.is_empty() {
            let known = self.repo.list_tags().await?;
            if let Some(unknown) = input.tag_ids.iter().find(|id| !known.iter().any(|t| t.id == **id)) {
                return Err(ServiceError::validation(format!("Неизвестный тег: {}", unknown)));
            }
        }
        Ok((title, content.to_string()))
    }

    async fn validate_tag(&self, input: &BlogTagInput, except: Option<i64>) -> ServiceResult<(String, String)> {
        let title = clean_title(&input.title, MAX_TAG_CHARS)?;
        let slug = match input.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => generate_slug(slug),
            _ => generate_slug(&title),
        };
        if slug.is_empty() {
            return Err(ServiceError::validation("Не удалось построить адрес тега"));
        }

        let clash = self
            .repo
            .list_tags()
            .await?
            .into_iter()
            .find(|t| Some(t.id) != except && (t.slug == slug || t.title == title));
        if let Some(tag) = clash {
            return Err(ServiceError::Conflict(format!("Тег «{}» уже существует", tag.title)));
        }
        Ok((title, slug))
    }
}
