mod dry_run;
mod resolve;
mod sitemap;

pub use dry_run::run_dry_run;
pub use resolve::run_resolve;
pub use sitemap::run_sitemap;
