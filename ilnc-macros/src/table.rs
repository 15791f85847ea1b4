use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Field, Type};

pub fn derive(tokens: proc_macro::TokenStream) -> TokenStream {
	let DeriveInput { ident, data, .. } = syn::parse(tokens).unwrap();

	let data = match data {
		Data::Struct(data) => data,
		Data::Enum(_) => panic!("enums are not supported"),
		Data::Union(_) => panic!("unions are not supported"),
	};

	let table = format_ident!("{}Table", ident);
	let reads = data.fields.iter().map(|Field { ident, ty, .. }| match ty {
		Type::Path(path) if path.path.is_ident("StringIndex") => quote! {
			#ident: StringIndex::read(stream, &sizes.string)?
		},
		Type::Path(path) if path.path.is_ident("BlobIndex") => quote! {
			#ident: BlobIndex::read(stream, &sizes.blob)?
		},
		Type::Path(path) if path.path.is_ident("GuidIndex") => quote! {
			#ident: GuidIndex::read(stream, &sizes.guid)?
		},
		Type::Path(path) if ["u8", "i8", "u16", "i16", "u32", "i32", "u64", "i64", "f32", "f64"]
			.iter()
			.any(|prim| path.path.is_ident(prim)) =>
		{
			quote!(#ident: crate::raw::FromByteStream::read(stream, &())?)
		}
		_ => quote!(#ident: crate::raw::FromByteStream::read(stream, sizes)?),
	});

	quote! {
		#[derive(Debug, Clone)]
		pub struct #table {
			rows: Vec<#ident>,
		}

		impl #table {
			pub fn read(stream: &mut std::io::Cursor<&[u8]>, sizes: &crate::raw::tables::IndexSizes, len: usize) -> std::io::Result<Self> {
				let mut rows = Vec::with_capacity(len);
				for _ in 0..len {
					rows.push(#ident { #(#reads),* });
				}
				Ok(Self { rows })
			}

			pub fn rows(&self) -> &[#ident] {
				&self.rows
			}

			pub fn get(&self, one_based_index: usize) -> Option<&#ident> {
				self.rows.get(one_based_index.checked_sub(1)?)
			}

			pub fn len(&self) -> usize {
				self.rows.len()
			}

			pub fn is_empty(&self) -> bool {
				self.rows.is_empty()
			}
		}
	}
}
