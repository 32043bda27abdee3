pub mod chunk;
pub mod completion;
pub mod config;
pub mod detect;
pub mod generate;
pub mod ignore;
pub mod note;
pub mod recent;
pub mod reports;
pub mod tree;
