pub(crate) mod binxml_builder;
