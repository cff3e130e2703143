use crate::binxml::tokens::BinXmlToken;
use crate::binxml::value_variant::read_value;
use crate::normalize::normalize_event_data;
use crate::template::{NodeRef, SubstitutionArray, TemplateNode};
use crate::utils::{ByteCursor, utf16le_to_utf8};
use hashbrown::HashMap;
use log::{trace, warn};
use std::cell::RefCell;
use std::rc::Rc;

/// Per-chunk dictionary of interned templates, keyed by their 32-bit short
/// id. Shared between a context and all of its branches.
pub(crate) type TemplateDict = Rc<RefCell<HashMap<u32, NodeRef>>>;

/// Decoder state for one chunk worth of BinXML.
///
/// A token loop drives a builder stack: the top of the stack is the element
/// currently receiving attributes and children. The context lives for the
/// whole chunk so that the template dictionary carries across records.
pub(crate) struct ParseContext<'a> {
    cursor: ByteCursor<'a>,
    root: NodeRef,
    stack: Vec<NodeRef>,
    /// Attribute key being bound, one slot per stack level.
    keys: Vec<String>,
    attribute_mode: bool,
    templates: TemplateDict,
}

impl<'a> ParseContext<'a> {
    pub(crate) fn new(data: &'a [u8], pos: usize) -> Self {
        let root = TemplateNode::new_ref();
        ParseContext {
            cursor: ByteCursor::with_pos(data, pos),
            stack: vec![Rc::clone(&root)],
            keys: vec![String::new()],
            root,
            attribute_mode: false,
            templates: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// A second context over the same buffer and template dictionary with an
    /// independent cursor and a fresh builder stack. Used for name-interning
    /// back-references, out-of-line template bodies and embedded BinXML.
    pub(crate) fn branch(&self) -> ParseContext<'a> {
        let root = TemplateNode::new_ref();
        ParseContext {
            cursor: self.cursor,
            stack: vec![Rc::clone(&root)],
            keys: vec![String::new()],
            root,
            attribute_mode: false,
            templates: Rc::clone(&self.templates),
        }
    }

    pub(crate) fn pos(&self) -> usize {
        self.cursor.pos()
    }

    pub(crate) fn set_pos(&mut self, pos: usize) {
        self.cursor.set_pos(pos);
    }

    pub(crate) fn cursor_mut(&mut self) -> &mut ByteCursor<'a> {
        &mut self.cursor
    }

    /// Reset the builder onto a fresh root, registering it in the template
    /// dictionary when `id` is non-zero. Each record (and each template
    /// definition) starts here.
    pub(crate) fn new_template(&mut self, id: u32) -> NodeRef {
        self.root = TemplateNode::new_ref();
        self.stack = vec![Rc::clone(&self.root)];
        self.keys = vec![String::new()];

        if id != 0 {
            self.templates
                .borrow_mut()
                .insert(id, Rc::clone(&self.root));
        }

        Rc::clone(&self.root)
    }

    pub(crate) fn current_template(&self) -> NodeRef {
        match self.stack.last() {
            Some(top) => Rc::clone(top),
            // An unbalanced stream writes into a throwaway node.
            None => TemplateNode::new_ref(),
        }
    }

    fn current_key(&self) -> String {
        if !self.attribute_mode {
            return String::new();
        }
        self.keys.last().cloned().unwrap_or_default()
    }

    fn push_template(&mut self, key: &str, template: NodeRef) {
        trace!("push template {} -> {}", self.stack.len(), self.stack.len() + 1);
        self.current_template()
            .borrow_mut()
            .set_nested(key, Rc::clone(&template));
        self.stack.push(template);
        self.keys.push(String::new());
    }

    fn pop_template(&mut self) {
        if !self.stack.is_empty() {
            trace!("pop template {} -> {}", self.stack.len(), self.stack.len() - 1);
            self.stack.pop();
            self.keys.pop();
        }
    }

    /// The token loop. Runs until an EOF token, an unreadable tag, or a
    /// malformed template instance; whatever was built so far stays on the
    /// tree, so partially-decoded records still expand.
    pub(crate) fn parse(&mut self) {
        loop {
            let pos = self.cursor.pos();
            let tag = self.cursor.u8();
            trace!("token {tag:#04x} @ {pos:#x}");

            let keep_going = match BinXmlToken::from_u8(tag) {
                Some(BinXmlToken::Eof) => false,
                Some(BinXmlToken::OpenStartElement { has_attributes }) => {
                    self.open_start_element(has_attributes)
                }
                Some(BinXmlToken::CloseStartElement) => self.close_start_element(),
                Some(BinXmlToken::CloseEmptyElement) | Some(BinXmlToken::CloseElement) => {
                    self.close_element()
                }
                Some(BinXmlToken::Value) => self.value_text(),
                Some(BinXmlToken::Attribute) => self.attribute(),
                Some(BinXmlToken::TemplateInstance) => self.template_instance(),
                Some(BinXmlToken::NormalSubstitution)
                | Some(BinXmlToken::OptionalSubstitution) => self.substitution(),
                Some(BinXmlToken::FragmentHeader) => {
                    // Major/minor version and flags.
                    self.cursor.skip(3);
                    true
                }
                // CDATA, character/entity references and processing
                // instructions do not occur in event payloads; nothing to
                // consume for them.
                Some(_) => true,
                None => {
                    warn!("unknown binxml token {tag:#04x} @ {pos:#x}, stopping this record");
                    false
                }
            };

            if !keep_going {
                break;
            }
        }
    }

    /// `<Element`: push a fresh subtree under the element's name.
    fn open_start_element(&mut self, has_attributes: bool) -> bool {
        // Dependency id (u16) and element data size (u32).
        self.cursor.skip(2 + 4);
        let name = self.read_name();

        if has_attributes {
            let _attribute_list_len = self.cursor.u32();
        }

        trace!("open element {name:?}");
        self.push_template(&name, TemplateNode::new_ref());
        true
    }

    /// The `>` of `<Element ...>`.
    fn close_start_element(&mut self) -> bool {
        self.attribute_mode = false;
        if let Some(key) = self.keys.last_mut() {
            key.clear();
        }
        true
    }

    /// `</Element>` or `/>`.
    fn close_element(&mut self) -> bool {
        self.pop_template();
        true
    }

    fn value_text(&mut self) -> bool {
        let _value_type = self.cursor.u8();
        let value = read_len_prefixed_utf16_string(&mut self.cursor, false);
        trace!("value {value:?} at key {:?}", self.current_key());

        let key = self.current_key();
        self.current_template()
            .borrow_mut()
            .set_literal(&key, value.into());
        self.attribute_mode = false;
        true
    }

    fn attribute(&mut self) -> bool {
        let name = self.read_name();
        trace!("attribute {name:?}");

        if let Some(key) = self.keys.last_mut() {
            *key = name;
        }
        self.attribute_mode = true;
        true
    }

    fn substitution(&mut self) -> bool {
        let id = self.cursor.u16();
        let mut value_type = self.cursor.u8();
        // A zero type byte defers to the next byte for the real type.
        if value_type == 0 {
            value_type = self.cursor.u8();
        }

        let key = self.current_key();
        self.current_template()
            .borrow_mut()
            .set_expansion(&key, u32::from(id), u32::from(value_type));
        true
    }

    /// Template definition-or-reuse, followed by the argument vector.
    ///
    /// The first occurrence of a template in a chunk carries the full body
    /// inline; later occurrences reference it by short id and skip straight
    /// to their arguments.
    fn template_instance(&mut self) -> bool {
        if self.cursor.u8() != 0x01 {
            return false;
        }

        let short_id = self.cursor.u32();
        if short_id == 0 {
            return false;
        }

        // Definition data offset; reuse is tracked by short id instead.
        self.cursor.skip(4);
        let mut num_arguments = self.cursor.u32();

        let known = self.templates.borrow().get(&short_id).map(Rc::clone);
        let template = match known {
            Some(template) => template,
            None => {
                trace!("defining template {short_id:#x}");
                // Long (GUID) template id, then the body length.
                self.cursor.skip(16);
                let body_len = self.cursor.u32();

                // The body is decoded on a branch; the dictionary entry is
                // installed first so self-references resolve.
                let mut branch = self.branch();
                let template = branch.new_template(short_id);
                branch.parse();

                self.cursor.skip(body_len as usize);
                num_arguments = self.cursor.u32();
                template
            }
        };

        let args = self.read_arguments(num_arguments);
        let expanded = template.borrow().expand(Some(&args));

        let key = self.current_key();
        match expanded {
            Some(mut event) => {
                normalize_event_data(&mut event);
                self.current_template().borrow_mut().set_literal(&key, event);
            }
            // An empty expansion leaves an empty slot at this key.
            None => {
                self.current_template()
                    .borrow_mut()
                    .set_expansion(&key, 0, 0);
            }
        }
        true
    }

    fn read_arguments(&mut self, num_arguments: u32) -> SubstitutionArray {
        let mut descriptors = Vec::with_capacity(num_arguments.min(64) as usize);
        for _ in 0..num_arguments {
            // Descriptor reads past the chunk end all decode to skipped
            // slots; stop early instead of materializing them.
            if self.cursor.pos().saturating_add(4) > self.cursor.buf().len() {
                break;
            }
            let size = self.cursor.u16();
            let value_type = self.cursor.u16();
            descriptors.push((size, value_type));
        }

        let mut args = SubstitutionArray::with_capacity(descriptors.len());
        for (index, (size, value_type)) in descriptors.into_iter().enumerate() {
            let value = read_value(self, size, value_type);
            trace!("argument {index}: type {value_type:#x} size {size:#x} -> {value:?}");
            args.push(value);
        }
        args
    }

    /// Element and attribute names are interned per chunk: the stored offset
    /// points either right past itself (inline definition) or back at an
    /// earlier occurrence, which is read on a branch.
    fn read_name(&mut self) -> String {
        let name_offset = self.cursor.u32() as usize;

        if name_offset != self.cursor.pos() {
            let mut branch = self.cursor;
            branch.set_pos(name_offset);
            branch.skip(4 + 2);
            return read_len_prefixed_utf16_string(&mut branch, true);
        }

        // Unused next-string offset and name hash.
        self.cursor.skip(4 + 2);
        read_len_prefixed_utf16_string(&mut self.cursor, true)
    }
}

/// A 16-bit code-unit count (plus one when NUL-terminated), then the UTF-16
/// payload.
fn read_len_prefixed_utf16_string(cursor: &mut ByteCursor<'_>, is_null_terminated: bool) -> String {
    let mut count = usize::from(cursor.u16());
    if is_null_terminated {
        count += 1;
    }
    let bytes = cursor.take_bytes(count * 2);
    utf16le_to_utf8(&bytes)
}
