use std::io::{Seek, Write};

use bstringify::bstringify;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::marshal::{
    encode_box_header, iso::HandlerBox, update_box_header, Decode, Encode, Error, Result,
};

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.11.1
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub struct MetaBox {
    pub handler: HandlerBox,
    pub primary_item: Option<PrimaryItemBox>,
    pub item_properties: Option<ItemPropertiesBox>,
}

impl Encode for MetaBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"meta")?;
        output.write_u8(0)?; // version
        output.write_u24::<BigEndian>(0)?; // flags

        self.handler.encode(output)?;
        if let Some(primary_item) = &self.primary_item {
            primary_item.encode(output)?;
        }
        if let Some(item_properties) = &self.item_properties {
            item_properties.encode(output)?;
        }

        update_box_header(output, begin)
    }
}

impl Decode for MetaBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // version
        input.read_u24::<BigEndian>()?; // flags

        let mut handler = None;
        let mut primary_item = None;
        let mut item_properties = None;

        decode_boxes! {
            input,
            required hdlr handler,
            optional pitm primary_item,
            optional iprp item_properties,
        }

        Ok(Self {
            handler,
            primary_item,
            item_properties,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 14496-12:2015 8.11.4
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryItemBox {
    pub item_id: u32,
}

impl PrimaryItemBox {
    fn version(&self) -> u8 {
        if self.item_id > u16::MAX as u32 {
            1
        } else {
            0
        }
    }
}

impl Encode for PrimaryItemBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"pitm")?;
        let version = self.version();
        output.write_u8(version)?;
        output.write_u24::<BigEndian>(0)?; // flags

        match version {
            0 => (self.item_id as u16).encode(output)?,
            _ => self.item_id.encode(output)?,
        }

        update_box_header(output, begin)
    }
}

impl Decode for PrimaryItemBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let version = input.read_u8()?;
        input.read_u24::<BigEndian>()?; // flags

        let item_id = match version {
            0 => u16::decode(input)? as u32,
            _ => Decode::decode(input)?,
        };
        Ok(Self { item_id })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 23008-12:2017 9.3
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Default)]
pub struct ItemPropertiesBox {
    pub container: ItemPropertyContainer,
}

impl Encode for ItemPropertiesBox {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"iprp")?;

        self.container.encode(output)?;

        update_box_header(output, begin)
    }
}

impl Decode for ItemPropertiesBox {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let mut container = None;

        decode_boxes! {
            input,
            required ipco container,
        }

        Ok(Self { container })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemProperty {
    ImageSpatialExtents(ImageSpatialExtentsProperty),
    Rotation(ImageRotation),
}

#[derive(Debug, Default)]
pub struct ItemPropertyContainer {
    properties: Vec<ItemProperty>,
}

impl ItemPropertyContainer {
    /// Appends a property and returns its 0-based index. When an equal
    /// image-size property is already present its index is reused instead;
    /// every other property kind is always appended, even if an equal one
    /// exists, so distinct items never get silently coalesced.
    pub fn add(&mut self, property: ItemProperty) -> usize {
        if let ItemProperty::ImageSpatialExtents(_) = &property {
            if let Some(index) = self.properties.iter().position(|other| *other == property) {
                return index;
            }
        }
        self.properties.push(property);
        self.properties.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&ItemProperty> {
        self.properties.get(index)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl Encode for ItemPropertyContainer {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"ipco")?;

        for property in &self.properties {
            match property {
                ItemProperty::ImageSpatialExtents(property) => property.encode(output),
                ItemProperty::Rotation(property) => property.encode(output),
            }?;
        }

        update_box_header(output, begin)
    }
}

impl Decode for ItemPropertyContainer {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let mut properties = Vec::default();
        while !input.is_empty() {
            let size = u32::decode(input)?;
            let r#type: [u8; 4] = u32::decode(input)?.to_be_bytes();

            if size < 4 + 4 || (size - 4 - 4) as usize > input.len() {
                return Err(Error::BoxOverrun {
                    r#type: u32::from_be_bytes(r#type).into(),
                    size,
                });
            }
            let (mut data, remaining_data) = input.split_at((size - 4 - 4) as usize);
            match &r#type {
                b"ispe" => properties.push(ItemProperty::ImageSpatialExtents(Decode::decode(
                    &mut data,
                )?)),
                b"irot" => properties.push(ItemProperty::Rotation(Decode::decode(&mut data)?)),
                _ => {}
            }
            *input = remaining_data;
        }
        Ok(Self { properties })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 23008-12:2017 6.5.3
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq)]
pub struct ImageSpatialExtentsProperty {
    pub width: u32,
    pub height: u32,
}

impl Encode for ImageSpatialExtentsProperty {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"ispe")?;
        output.write_u8(0)?; // version
        output.write_u24::<BigEndian>(0)?; // flags

        self.width.encode(output)?;
        self.height.encode(output)?;

        update_box_header(output, begin)
    }
}

impl Decode for ImageSpatialExtentsProperty {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        input.read_u8()?; // version
        input.read_u24::<BigEndian>()?; // flags

        Ok(Self {
            width: Decode::decode(input)?,
            height: Decode::decode(input)?,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ISO/IEC 23008-12:2017 6.5.10
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Rotation in anti-clockwise 90 degree steps (0-3).
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRotation {
    pub angle: u8,
}

impl Encode for ImageRotation {
    fn encode(&self, output: &mut (impl Write + Seek)) -> Result<()> {
        let begin = encode_box_header(output, *b"irot")?;

        output.write_u8(self.angle & 0x3)?;

        update_box_header(output, begin)
    }
}

impl Decode for ImageRotation {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            angle: input.read_u8()? & 0x3,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn primary_item_width_follows_version() {
        let narrow = PrimaryItemBox { item_id: 1 };
        let mut output = Cursor::new(Vec::new());
        narrow.encode(&mut output).unwrap();
        let data = output.into_inner();
        assert_eq!(data.len(), 14); // header + version/flags + u16
        assert_eq!(data[8], 0);
        let mut input = &data[8..];
        assert_eq!(PrimaryItemBox::decode(&mut input).unwrap(), narrow);

        let wide = PrimaryItemBox {
            item_id: u16::MAX as u32 + 1,
        };
        let mut output = Cursor::new(Vec::new());
        wide.encode(&mut output).unwrap();
        let data = output.into_inner();
        assert_eq!(data.len(), 16);
        assert_eq!(data[8], 1);
        let mut input = &data[8..];
        assert_eq!(PrimaryItemBox::decode(&mut input).unwrap(), wide);
    }

    #[test]
    fn equal_image_extents_share_an_index() {
        let mut container = ItemPropertyContainer::default();
        let first = container.add(ItemProperty::ImageSpatialExtents(
            ImageSpatialExtentsProperty {
                width: 320,
                height: 240,
            },
        ));
        let second = container.add(ItemProperty::ImageSpatialExtents(
            ImageSpatialExtentsProperty {
                width: 640,
                height: 480,
            },
        ));
        let repeat = container.add(ItemProperty::ImageSpatialExtents(
            ImageSpatialExtentsProperty {
                width: 320,
                height: 240,
            },
        ));
        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert_eq!(repeat, first);
        assert_eq!(container.len(), 2);
    }

    #[test]
    fn equal_rotations_are_never_merged() {
        let mut container = ItemPropertyContainer::default();
        let first = container.add(ItemProperty::Rotation(ImageRotation { angle: 1 }));
        let second = container.add(ItemProperty::Rotation(ImageRotation { angle: 1 }));
        assert_ne!(first, second);
        assert_eq!(container.len(), 2);
    }

    #[test]
    fn out_of_range_property_is_none() {
        let mut container = ItemPropertyContainer::default();
        container.add(ItemProperty::Rotation(ImageRotation { angle: 2 }));
        assert!(container.get(0).is_some());
        assert!(container.get(1).is_none());
    }

    #[test]
    fn property_container_round_trips_in_order() {
        let mut container = ItemPropertyContainer::default();
        container.add(ItemProperty::ImageSpatialExtents(
            ImageSpatialExtentsProperty {
                width: 1280,
                height: 720,
            },
        ));
        container.add(ItemProperty::Rotation(ImageRotation { angle: 3 }));

        let mut output = Cursor::new(Vec::new());
        container.encode(&mut output).unwrap();
        let data = output.into_inner();
        let mut input = &data[8..];
        let decoded = ItemPropertyContainer::decode(&mut input).unwrap();
        assert_eq!(decoded.properties, container.properties);
    }
}
