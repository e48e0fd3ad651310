use amora_derive::amora_error;
use std::borrow::Cow;

#[amora_error]
pub enum DemoError {
    #[error("IO error{}: {source}", format_context(.context))]
    Io {
        #[source]
        source: std::io::Error,
        context: Option<Cow<'static, str>>,
    },

    #[error("Missing item{}: {message}", format_context(.context))]
    Missing { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

fn read_missing() -> Result<Vec<u8>, DemoError> {
    Ok(std::fs::read("/definitely/not/here").context("reading fixture")?)
}

fn main() {
    let err = read_missing().expect_err("fixture must be absent");
    assert!(err.to_string().contains("(reading fixture)"));

    let missing: Result<(), DemoError> =
        Err(DemoError::Missing { message: "avatar.png".into(), context: None });
    let err = missing.context("lookup").expect_err("still an error");
    assert_eq!(err.to_string(), "Missing item (lookup): avatar.png");

    let internal: DemoError = "boom".into();
    assert!(matches!(internal, DemoError::Internal { .. }));
}
