use crate::error::ConvertError;
use lopdf::{content::Content, dictionary, Dictionary, Document, Object, ObjectId, Stream};

/// Collects pages into a single PDF. Output carries no timestamps or random IDs, so
/// identical input yields identical bytes.
pub struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub fn add_object<T: Into<Object>>(&mut self, object: T) -> ObjectId {
        self.doc.add_object(object)
    }

    pub fn add_page(
        &mut self,
        width: f32,
        height: f32,
        content: Content,
        resources: Dictionary,
    ) -> Result<(), ConvertError> {
        let content_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), content.encode()?));
        let media_box: Vec<Object> = vec![
            Object::Integer(0),
            Object::Integer(0),
            width.into(),
            height.into(),
        ];
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => media_box,
            "Contents" => content_id,
            "Resources" => resources,
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    pub fn finish(mut self) -> Result<Vec<u8>, ConvertError> {
        let count = self.kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids,
            "Count" => count,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();

        let mut buf = Vec::new();
        self.doc
            .save_to(&mut buf)
            .map_err(|e| ConvertError::Render(format!("serialize pdf: {e}")))?;
        Ok(buf)
    }
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_loadable_document() {
        let mut pdf = PdfBuilder::new();
        pdf.add_page(200.0, 100.0, Content { operations: vec![] }, Dictionary::new())
            .unwrap();
        pdf.add_page(200.0, 100.0, Content { operations: vec![] }, Dictionary::new())
            .unwrap();
        assert_eq!(pdf.page_count(), 2);

        let bytes = pdf.finish().unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }
}
