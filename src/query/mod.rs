//! Query DSL model and template rendering.

pub mod dsl;
pub mod template;

pub use self::dsl::{
    BoolQuery, ExistsQuery, IdsQuery, MatchQuery, Operator, QueryDsl, RangeQuery, Script,
    ScriptScoreQuery, TermQuery, TermsQuery,
};
pub use self::template::{ParamValue, TemplateParams};
