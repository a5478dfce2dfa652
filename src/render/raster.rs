use super::{pdf::PdfBuilder, Rendered};
use crate::config::{Anchor, Config, PageMode};
use crate::error::ConvertError;
use image::{DynamicImage, ImageReader, Rgb, RgbImage};
use lopdf::{
    content::{Content, Operation},
    dictionary, Object, Stream,
};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Scales an image into the printable area of a page by the tighter of the two
/// axis ratios. PDF coordinates, origin at the bottom-left.
pub fn fit_image(
    img_w: u32,
    img_h: u32,
    page_w: f32,
    page_h: f32,
    margin: f32,
    anchor: Anchor,
) -> Placement {
    let avail_w = (page_w - 2.0 * margin).max(1.0);
    let avail_h = (page_h - 2.0 * margin).max(1.0);
    let (img_w, img_h) = (img_w.max(1) as f32, img_h.max(1) as f32);

    let scale = (avail_w / img_w).min(avail_h / img_h);
    let width = img_w * scale;
    let height = img_h * scale;

    match anchor {
        Anchor::Center => Placement {
            x: margin + (avail_w - width) / 2.0,
            y: margin + (avail_h - height) / 2.0,
            width,
            height,
        },
        Anchor::TopLeft => Placement {
            x: margin,
            y: page_h - margin - height,
            width,
            height,
        },
    }
}

pub fn render_image(path: &Path, cfg: &Config) -> Result<Rendered, ConvertError> {
    let img = ImageReader::open(path)
        .map_err(|e| ConvertError::read(path, e))?
        .with_guessed_format()
        .map_err(|e| ConvertError::read(path, e))?
        .decode()?;

    let rgb = flatten_to_rgb(img);
    let (w, h) = rgb.dimensions();
    if w == 0 || h == 0 {
        return Err(ConvertError::Render(format!("image has no pixels: {w}x{h}")));
    }

    let (page_w, page_h, placement) = match cfg.image.page_mode {
        PageMode::Fixed => (
            cfg.page.width,
            cfg.page.height,
            fit_image(
                w,
                h,
                cfg.page.width,
                cfg.page.height,
                cfg.page.margin,
                cfg.image.anchor,
            ),
        ),
        PageMode::Image => {
            let (pw, ph) = (w as f32, h as f32);
            (
                pw,
                ph,
                Placement {
                    x: 0.0,
                    y: 0.0,
                    width: pw,
                    height: ph,
                },
            )
        }
    };

    let mut pdf = PdfBuilder::new();
    let image_id = pdf.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => w as i64,
            "Height" => h as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
        },
        rgb.into_raw(),
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    placement.width.into(),
                    Object::Integer(0),
                    Object::Integer(0),
                    placement.height.into(),
                    placement.x.into(),
                    placement.y.into(),
                ],
            ),
            Operation::new("Do", vec!["Im1".into()]),
            Operation::new("Q", vec![]),
        ],
    };
    let resources = dictionary! {
        "XObject" => dictionary! { "Im1" => image_id },
    };
    pdf.add_page(page_w, page_h, content, resources)?;

    Ok(Rendered {
        bytes: pdf.finish()?,
        pages: 1,
    })
}

/// Drops palette/grayscale/16-bit modes to 8-bit RGB, compositing alpha over white.
fn flatten_to_rgb(img: DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.into_rgb8();
    }
    let rgba = img.into_rgba8();
    let (w, h) = rgba.dimensions();
    let mut out = RgbImage::new(w, h);
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let a = a as u16;
        let blend = |c: u8| ((c as u16 * a + 255 * (255 - a) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}
