/// BinXML token tags.
///
/// The `0x40` bit on the open-element, value and attribute tags marks the
/// "more data" variants (an attribute list on elements); both variants decode
/// the same way here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinXmlToken {
    Eof,
    OpenStartElement { has_attributes: bool },
    CloseStartElement,
    CloseEmptyElement,
    CloseElement,
    Value,
    Attribute,
    CDataSection,
    CharRef,
    EntityRef,
    PITarget,
    PIData,
    TemplateInstance,
    NormalSubstitution,
    OptionalSubstitution,
    FragmentHeader,
}

impl BinXmlToken {
    pub fn from_u8(tag: u8) -> Option<BinXmlToken> {
        match tag {
            0x00 => Some(BinXmlToken::Eof),
            0x01 => Some(BinXmlToken::OpenStartElement {
                has_attributes: false,
            }),
            0x41 => Some(BinXmlToken::OpenStartElement {
                has_attributes: true,
            }),
            0x02 => Some(BinXmlToken::CloseStartElement),
            0x03 => Some(BinXmlToken::CloseEmptyElement),
            0x04 => Some(BinXmlToken::CloseElement),
            0x05 | 0x45 => Some(BinXmlToken::Value),
            0x06 | 0x46 => Some(BinXmlToken::Attribute),
            0x07 | 0x47 => Some(BinXmlToken::CDataSection),
            0x08 | 0x48 => Some(BinXmlToken::CharRef),
            0x09 | 0x49 => Some(BinXmlToken::EntityRef),
            0x0a => Some(BinXmlToken::PITarget),
            0x0b => Some(BinXmlToken::PIData),
            0x0c => Some(BinXmlToken::TemplateInstance),
            0x0d => Some(BinXmlToken::NormalSubstitution),
            0x0e => Some(BinXmlToken::OptionalSubstitution),
            0x0f => Some(BinXmlToken::FragmentHeader),
            _ => None,
        }
    }
}
