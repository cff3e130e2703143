pub(crate) mod deserializer;
pub(crate) mod tokens;
pub(crate) mod value_variant;

pub(crate) use deserializer::ParseContext;
