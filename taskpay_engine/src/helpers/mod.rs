pub mod codes;
pub mod mail_matcher;
