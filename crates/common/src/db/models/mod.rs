//! SeaORM entity models
//!
//! Database entities for ScholarMint

mod article;
mod article_author;
mod draft;
mod profile;
mod verification;

pub use article::{
    Entity as ArticleEntity,
    Model as Article,
    ActiveModel as ArticleActiveModel,
    Column as ArticleColumn,
};

pub use article_author::{
    Entity as ArticleAuthorEntity,
    Model as ArticleAuthor,
    ActiveModel as ArticleAuthorActiveModel,
    Column as ArticleAuthorColumn,
};

pub use draft::{
    Entity as DraftEntity,
    Model as Draft,
    ActiveModel as DraftActiveModel,
    Column as DraftColumn,
};

pub use profile::{
    Entity as ProfileEntity,
    Model as Profile,
    ActiveModel as ProfileActiveModel,
    Column as ProfileColumn,
};

pub use verification::{
    Entity as VerificationEntity,
    Model as VerificationRecord,
    ActiveModel as VerificationActiveModel,
    Column as VerificationColumn,
};
